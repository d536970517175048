//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::db::{
    BlockFactRepository, BlockRepository, DbOperation, DbValue, FilterRepository,
    HeaderRepository, OperationSink, QueuedStorageDiff, RepositoryError, StorageQueue,
    UpsertOutcome, WatchedEventRepository,
};
use crate::rpc::{BlockChain, ChainError, RpcError};
use crate::transformations::{
    StorageTransformer, TailError, Tailer, TransformationError, Transformer, TransformerDeps,
};
use crate::types::chain::{Block, Header, Log, LogFilter, Node, StorageDiffRow, WatchedEvent};

pub fn hash_for(number: i64) -> B256 {
    B256::from(U256::from(number as u64))
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBlockChain {
    head: Mutex<i64>,
    head_unreachable: Mutex<bool>,
    blocks: Mutex<HashMap<i64, Block>>,
    failing: Mutex<HashSet<i64>>,
    logs: Mutex<Vec<Log>>,
    fetched: Mutex<Vec<i64>>,
    node: Node,
}

impl FakeBlockChain {
    pub fn with_head(head: i64) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    pub fn set_head(&self, head: i64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn set_head_unreachable(&self, unreachable: bool) {
        *self.head_unreachable.lock().unwrap() = unreachable;
    }

    pub fn set_block(&self, block: Block) {
        self.blocks.lock().unwrap().insert(block.number, block);
    }

    pub fn fail_block(&self, number: i64) {
        self.failing.lock().unwrap().insert(number);
    }

    pub fn set_logs(&self, logs: Vec<Log>) {
        *self.logs.lock().unwrap() = logs;
    }

    /// Numbers passed to block or header fetches, in call order.
    pub fn fetched(&self) -> Vec<i64> {
        self.fetched.lock().unwrap().clone()
    }

    fn fetch(&self, number: i64) -> Result<Block, ChainError> {
        self.fetched.lock().unwrap().push(number);
        if number < 0 {
            return Err(ChainError::BlockNotFound(number));
        }
        if self.failing.lock().unwrap().contains(&number) {
            return Err(ChainError::Fetch {
                block: number,
                source: RpcError::provider("eth_getBlockByNumber", "connection reset"),
            });
        }
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_else(|| Block {
                number,
                hash: hash_for(number),
                ..Default::default()
            }))
    }
}

#[async_trait]
impl BlockChain for FakeBlockChain {
    async fn last_block(&self) -> Result<i64, ChainError> {
        if *self.head_unreachable.lock().unwrap() {
            return Err(ChainError::Rpc(RpcError::provider(
                "eth_blockNumber",
                "connection refused",
            )));
        }
        Ok(*self.head.lock().unwrap())
    }

    async fn get_block_by_number(&self, number: i64) -> Result<Block, ChainError> {
        self.fetch(number)
    }

    async fn get_header_by_number(&self, number: i64) -> Result<Header, ChainError> {
        let block = self.fetch(number)?;
        Ok(Header {
            block_number: block.number,
            hash: block.hash,
            raw: b"{}".to_vec(),
            timestamp: block.time,
        })
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    fn node(&self) -> &Node {
        &self.node
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

fn backend(message: &str) -> RepositoryError {
    RepositoryError::Backend(message.to_string())
}

#[derive(Default)]
pub struct FakeBlockRepository {
    blocks: Mutex<BTreeMap<i64, Block>>,
    failing: Mutex<HashSet<i64>>,
    status_calls: Mutex<Vec<(i64, i64)>>,
    upserts: Mutex<Vec<i64>>,
}

impl FakeBlockRepository {
    pub fn with_blocks(numbers: impl IntoIterator<Item = i64>) -> Self {
        let repo = Self::default();
        {
            let mut blocks = repo.blocks.lock().unwrap();
            for number in numbers {
                blocks.insert(
                    number,
                    Block {
                        number,
                        hash: hash_for(number),
                        ..Default::default()
                    },
                );
            }
        }
        repo
    }

    pub fn fail_on(&self, number: i64) {
        self.failing.lock().unwrap().insert(number);
    }

    pub fn stored(&self) -> Vec<Block> {
        self.blocks.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, number: i64) -> Option<Block> {
        self.blocks.lock().unwrap().get(&number).cloned()
    }

    pub fn upserts(&self) -> Vec<i64> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> Vec<(i64, i64)> {
        self.status_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockRepository for FakeBlockRepository {
    async fn create_or_update_block(&self, block: &Block) -> Result<UpsertOutcome, RepositoryError> {
        if self.failing.lock().unwrap().contains(&block.number) {
            return Err(backend("insert failed"));
        }
        self.upserts.lock().unwrap().push(block.number);

        let mut blocks = self.blocks.lock().unwrap();
        let outcome = match blocks.get(&block.number) {
            Some(existing) if existing.hash == block.hash => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };
        blocks.insert(block.number, block.clone());
        Ok(outcome)
    }

    async fn missing_block_numbers(&self, start: i64, end: i64) -> Result<Vec<i64>, RepositoryError> {
        let blocks = self.blocks.lock().unwrap();
        Ok((start..=end).filter(|n| !blocks.contains_key(n)).collect())
    }

    async fn set_blocks_status(
        &self,
        chain_head: i64,
        finality_lag: i64,
    ) -> Result<u64, RepositoryError> {
        self.status_calls
            .lock()
            .unwrap()
            .push((chain_head, finality_lag));

        let mut marked = 0;
        for block in self.blocks.lock().unwrap().values_mut() {
            if block.number < chain_head - finality_lag && !block.is_final {
                block.is_final = true;
                marked += 1;
            }
        }
        Ok(marked)
    }
}

#[derive(Default)]
pub struct FakeHeaderRepository {
    headers: Mutex<BTreeMap<i64, Header>>,
    failing: Mutex<HashSet<i64>>,
    upserts: Mutex<Vec<i64>>,
    written_after_scan: Mutex<Vec<i64>>,
}

impl FakeHeaderRepository {
    pub fn with_headers(numbers: impl IntoIterator<Item = i64>) -> Self {
        let repo = Self::default();
        {
            let mut headers = repo.headers.lock().unwrap();
            for number in numbers {
                headers.insert(
                    number,
                    Header {
                        block_number: number,
                        hash: hash_for(number),
                        ..Default::default()
                    },
                );
            }
        }
        repo
    }

    pub fn fail_on(&self, number: i64) {
        self.failing.lock().unwrap().insert(number);
    }

    pub fn upserts(&self) -> Vec<i64> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn numbers(&self) -> Vec<i64> {
        self.headers.lock().unwrap().keys().copied().collect()
    }

    /// Reports `number` missing once, then stores it as another writer would.
    pub fn write_after_scan(&self, number: i64) {
        self.written_after_scan.lock().unwrap().push(number);
    }
}

#[async_trait]
impl HeaderRepository for FakeHeaderRepository {
    async fn create_or_update_header(
        &self,
        header: &Header,
    ) -> Result<UpsertOutcome, RepositoryError> {
        if self.failing.lock().unwrap().contains(&header.block_number) {
            return Err(backend("insert failed"));
        }
        self.upserts.lock().unwrap().push(header.block_number);

        let mut headers = self.headers.lock().unwrap();
        let outcome = match headers.get(&header.block_number) {
            Some(existing) if existing.hash == header.hash => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };
        headers.insert(header.block_number, header.clone());
        Ok(outcome)
    }

    async fn header_exists(&self, block_number: i64) -> Result<bool, RepositoryError> {
        Ok(self.headers.lock().unwrap().contains_key(&block_number))
    }

    async fn missing_block_numbers(&self, start: i64, end: i64) -> Result<Vec<i64>, RepositoryError> {
        let mut headers = self.headers.lock().unwrap();
        let missing = (start..=end).filter(|n| !headers.contains_key(n)).collect();
        for number in self.written_after_scan.lock().unwrap().drain(..) {
            headers.insert(
                number,
                Header {
                    block_number: number,
                    hash: hash_for(number),
                    raw: b"{}".to_vec(),
                    ..Default::default()
                },
            );
        }
        Ok(missing)
    }
}

#[derive(Default)]
pub struct FakeFilterRepository {
    filters: Mutex<HashMap<String, LogFilter>>,
}

impl FakeFilterRepository {
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.filters.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl FilterRepository for FakeFilterRepository {
    async fn create_filter(&self, filter: &LogFilter) -> Result<(), RepositoryError> {
        if filter.name.trim().is_empty() {
            return Err(RepositoryError::EmptyFilterName);
        }
        let mut filters = self.filters.lock().unwrap();
        if filters.contains_key(&filter.name) {
            return Err(RepositoryError::DuplicateFilter(filter.name.clone()));
        }
        filters.insert(filter.name.clone(), filter.clone());
        Ok(())
    }

    async fn get_filter(&self, name: &str) -> Result<LogFilter, RepositoryError> {
        self.filters
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RepositoryError::FilterNotFound(name.to_string()))
    }
}

#[derive(Default)]
pub struct FakeWatchedEventRepository {
    events: Mutex<HashMap<String, Vec<WatchedEvent>>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeWatchedEventRepository {
    pub fn add(&self, event: WatchedEvent) {
        self.events
            .lock()
            .unwrap()
            .entry(event.name.clone())
            .or_default()
            .push(event);
    }

    pub fn fail_on(&self, filter_name: &str) {
        self.failing.lock().unwrap().insert(filter_name.to_string());
    }
}

#[async_trait]
impl WatchedEventRepository for FakeWatchedEventRepository {
    async fn get_watched_events(
        &self,
        filter_name: &str,
    ) -> Result<Vec<WatchedEvent>, RepositoryError> {
        if self.failing.lock().unwrap().contains(filter_name) {
            return Err(backend("query failed"));
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(filter_name)
            .cloned()
            .unwrap_or_default())
    }
}

/// Applies operations to in-memory tables. Upserts without update columns
/// ignore rows whose conflict key is already present.
#[derive(Default)]
pub struct FakeOperationSink {
    tables: Mutex<HashMap<String, BTreeMap<Vec<String>, Vec<DbValue>>>>,
    batches: AtomicUsize,
    fail: Mutex<bool>,
}

impl FakeOperationSink {
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn rows(&self, table: &str) -> Vec<Vec<DbValue>> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationSink for FakeOperationSink {
    async fn execute(&self, operations: Vec<DbOperation>) -> Result<(), RepositoryError> {
        if *self.fail.lock().unwrap() {
            return Err(backend("transaction aborted"));
        }
        self.batches.fetch_add(1, Ordering::SeqCst);

        let mut tables = self.tables.lock().unwrap();
        for op in operations {
            let key: Vec<String> = op.conflict_key().iter().map(|v| format!("{:?}", v)).collect();
            let rows = tables.entry(op.table.clone()).or_default();
            if op.update_columns.is_empty() && rows.contains_key(&key) {
                continue;
            }
            rows.insert(key, op.values);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStorageQueue {
    rows: Mutex<Vec<QueuedStorageDiff>>,
    next_id: AtomicUsize,
}

impl FakeStorageQueue {
    pub fn rows(&self) -> Vec<StorageDiffRow> {
        self.rows.lock().unwrap().iter().map(|q| q.row.clone()).collect()
    }
}

#[async_trait]
impl StorageQueue for FakeStorageQueue {
    async fn add(&self, row: &StorageDiffRow) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|q| &q.row == row) {
            return Ok(());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        rows.push(QueuedStorageDiff {
            id,
            row: row.clone(),
        });
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<QueuedStorageDiff>, RepositoryError> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        self.rows.lock().unwrap().retain(|q| q.id != id);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBlockFactRepository {
    missing: Mutex<Vec<i64>>,
    queries: Mutex<Vec<(String, i64, i64)>>,
}

impl FakeBlockFactRepository {
    pub fn set_missing(&self, numbers: Vec<i64>) {
        *self.missing.lock().unwrap() = numbers;
    }

    pub fn queries(&self) -> Vec<(String, i64, i64)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockFactRepository for FakeBlockFactRepository {
    async fn missing_fact_blocks(
        &self,
        fact_table: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<i64>, RepositoryError> {
        self.queries
            .lock()
            .unwrap()
            .push((fact_table.to_string(), start, end));
        Ok(self
            .missing
            .lock()
            .unwrap()
            .iter()
            .copied()
            .filter(|n| (start..=end).contains(n))
            .collect())
    }
}

pub fn deps() -> (TransformerDeps, Arc<FakeWatchedEventRepository>, Arc<FakeOperationSink>) {
    let events = Arc::new(FakeWatchedEventRepository::default());
    let sink = Arc::new(FakeOperationSink::default());
    let deps = TransformerDeps {
        chain: Arc::new(FakeBlockChain::with_head(100)),
        watched_events: events.clone(),
        sink: sink.clone(),
        block_facts: Arc::new(FakeBlockFactRepository::default()),
    };
    (deps, events, sink)
}

// ---------------------------------------------------------------------------
// Transformers and tail source
// ---------------------------------------------------------------------------

pub struct MockTransformer {
    name: String,
    error: Option<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockTransformer {
    /// `calls` is shared between mocks so tests can assert execution order.
    pub fn new(name: &str, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            error: None,
            calls,
        }
    }

    pub fn failing(name: &str, message: &str, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::new(name, calls)
        }
    }
}

#[async_trait]
impl Transformer for MockTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<(), TransformationError> {
        self.calls.lock().unwrap().push(self.name.clone());
        match &self.error {
            Some(message) => Err(TransformationError::handler(&self.name, message.clone())),
            None => Ok(()),
        }
    }
}

pub struct MockStorageTransformer {
    address: Address,
    fail: Mutex<bool>,
    rows: Mutex<Vec<StorageDiffRow>>,
}

impl MockStorageTransformer {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            fail: Mutex::new(false),
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn rows(&self) -> Vec<StorageDiffRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageTransformer for MockStorageTransformer {
    fn contract_address(&self) -> Address {
        self.address
    }

    async fn execute(&self, row: &StorageDiffRow) -> Result<(), TransformationError> {
        if *self.fail.lock().unwrap() {
            return Err(TransformationError::handler("mock-storage", "row rejected"));
        }
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }
}

/// Emits a fixed set of lines, then closes the channel.
pub struct FakeTailer {
    lines: Vec<String>,
}

impl FakeTailer {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Tailer for FakeTailer {
    async fn tail(
        &self,
        _cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<String>, TailError> {
        let (tx, rx) = mpsc::channel(self.lines.len().max(1));
        for line in &self.lines {
            let _ = tx.send(line.clone()).await;
        }
        Ok(rx)
    }
}
