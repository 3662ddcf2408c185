//! In-memory source for tests/dev.

use cleanslate_core::SourceName;
use cleanslate_inventory::{Diagnostics, MovementRecord, StockSnapshot};

use super::{FetchWindow, SourceAdapter, SourceError};

/// Serves fixed snapshots and movements; can be told to fail.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    name: SourceName,
    items: Vec<StockSnapshot>,
    movements: Vec<MovementRecord>,
    unreachable: Option<String>,
    fail_fetch: Option<String>,
    open: bool,
}

impl InMemorySource {
    pub fn new(name: SourceName) -> Self {
        Self {
            name,
            items: Vec::new(),
            movements: Vec::new(),
            unreachable: None,
            fail_fetch: None,
            open: false,
        }
    }

    pub fn with_items(mut self, items: Vec<StockSnapshot>) -> Self {
        self.items = items;
        self
    }

    pub fn with_movements(mut self, movements: Vec<MovementRecord>) -> Self {
        self.movements = movements;
        self
    }

    /// Refuse every connection attempt.
    pub fn unreachable(mut self, reason: impl Into<String>) -> Self {
        self.unreachable = Some(reason.into());
        self
    }

    /// Answer connection checks but fail on fetch.
    pub fn failing_fetch(mut self, reason: impl Into<String>) -> Self {
        self.fail_fetch = Some(reason.into());
        self
    }

    fn connect(&mut self) -> Result<(), SourceError> {
        if let Some(reason) = &self.unreachable {
            return Err(SourceError::unreachable(&self.name, reason.clone()));
        }
        self.open = true;
        Ok(())
    }

    fn check_fetch(&self) -> Result<(), SourceError> {
        match &self.fail_fetch {
            Some(reason) => Err(SourceError::unreachable(&self.name, reason.clone())),
            None => Ok(()),
        }
    }
}

impl SourceAdapter for InMemorySource {
    fn name(&self) -> &SourceName {
        &self.name
    }

    fn check_connection(&mut self) -> Result<(), SourceError> {
        self.connect()
    }

    fn fetch_items(&mut self, _diagnostics: &mut Diagnostics) -> Result<Vec<StockSnapshot>, SourceError> {
        self.connect()?;
        self.check_fetch()?;
        Ok(self.items.clone())
    }

    fn fetch_movements(&mut self, _window: FetchWindow) -> Result<Vec<MovementRecord>, SourceError> {
        self.connect()?;
        self.check_fetch()?;
        Ok(self.movements.clone())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
