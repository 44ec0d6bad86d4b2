//! Two in-memory stores updated atomically by one transaction.
//!
//! Run with: `RUST_LOG=xa_coordinator=trace cargo run --example two_phase_commit`

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;
use xa_coordinator::xa::{XAER_NOTA, XA_OK, XA_RDONLY};
use xa_coordinator::{
    async_trait, TransactionContext, TransactionManager, XaError, XaResource, Xid,
};

/// Key-value store that stages writes per branch until commit.
struct MemoryStore {
    name: &'static str,
    rm: Uuid,
    committed: Mutex<HashMap<String, i64>>,
    staged: Mutex<HashMap<Xid, HashMap<String, i64>>>,
}

impl MemoryStore {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            rm: Uuid::new_v4(),
            committed: Mutex::new(HashMap::new()),
            staged: Mutex::new(HashMap::new()),
        })
    }

    fn put(&self, xid: &Xid, key: &str, value: i64) {
        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        staged
            .entry(xid.clone())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<i64> {
        let committed = self.committed.lock().unwrap_or_else(|e| e.into_inner());
        committed.get(key).copied()
    }
}

#[async_trait]
impl XaResource for MemoryStore {
    fn resource_manager_id(&self) -> Uuid {
        self.rm
    }

    async fn set_transaction_timeout(&self, _timeout: Duration) -> Result<bool, XaError> {
        Ok(false)
    }

    async fn start(&self, xid: &Xid, _flags: i32) -> Result<(), XaError> {
        println!("  [{}] start {}", self.name, xid);
        Ok(())
    }

    async fn end(&self, _xid: &Xid, _flags: i32) -> Result<(), XaError> {
        Ok(())
    }

    async fn prepare(&self, xid: &Xid) -> Result<i32, XaError> {
        let staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        let vote = if staged.contains_key(xid) { XA_OK } else { XA_RDONLY };
        println!("  [{}] prepare -> {}", self.name, xa_coordinator::describe_xa_code(vote));
        Ok(vote)
    }

    async fn commit(&self, xid: &Xid, _one_phase: bool) -> Result<(), XaError> {
        let writes = self
            .staged
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(xid)
            .ok_or_else(|| XaError::from_code(XAER_NOTA))?;
        println!("  [{}] commit {} write(s)", self.name, writes.len());
        self.committed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(writes);
        Ok(())
    }

    async fn rollback(&self, xid: &Xid) -> Result<(), XaError> {
        println!("  [{}] rollback", self.name);
        self.staged
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(xid);
        Ok(())
    }

    async fn forget(&self, _xid: &Xid) -> Result<(), XaError> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Two-Phase Commit Example ===\n");

    let manager = TransactionManager::new();
    let mut subscription = manager.subscribe();
    let watcher = tokio::spawn(async move {
        while let Some(event) = subscription.next().await {
            println!("  event: {} -> {}", event.xid(), event.status());
        }
    });

    let accounts = MemoryStore::new("accounts");
    let audit = MemoryStore::new("audit");

    println!("--- Transfer committed ---\n");
    let mut ctx = TransactionContext::new();
    let tx = manager.begin(&mut ctx)?;
    tx.enlist_resource(accounts.clone()).await?;
    tx.enlist_resource(audit.clone()).await?;
    accounts.put(tx.xid(), "alice", 70);
    accounts.put(tx.xid(), "bob", 30);
    audit.put(tx.xid(), "transfers", 1);
    manager.commit(&mut ctx).await?;
    println!(
        "\nalice={:?} bob={:?} transfers={:?}\n",
        accounts.get("alice"),
        accounts.get("bob"),
        audit.get("transfers")
    );

    println!("--- Transfer rolled back ---\n");
    let tx = manager.begin(&mut ctx)?;
    tx.enlist_resource(accounts.clone()).await?;
    accounts.put(tx.xid(), "alice", 0);
    manager.set_rollback_only(&ctx)?;
    if let Err(error) = manager.commit(&mut ctx).await {
        println!("\ncommit refused: {error}");
    }
    println!("alice={:?}\n", accounts.get("alice"));

    tokio::time::sleep(Duration::from_millis(10)).await;
    watcher.abort();
    Ok(())
}
