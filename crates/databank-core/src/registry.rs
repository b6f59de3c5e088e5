//! # Registry
//!
//! An explicitly constructed map from record type to bank.
//!
//! The registry initializes every bank at startup, hands out typed bank
//! handles, and keeps a `BankInfo` notation per bank that is refreshed from
//! the bank's own events.

use crate::bank::{Bank, BankEvent};
use crate::{BankError, BankInfo, Record};
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

/// Type-erased bank operations the registry drives.
#[async_trait]
trait ErasedBank: Send + Sync {
    fn bank_id(&self) -> String;
    fn initialize(&self) -> Result<usize, BankError>;
    async fn initialize_async(&self, cancel: &CancellationToken) -> Result<usize, BankError>;
}

#[async_trait]
impl<R: Record> ErasedBank for Bank<R> {
    fn bank_id(&self) -> String {
        self.id()
    }

    fn initialize(&self) -> Result<usize, BankError> {
        Bank::initialize(self)
    }

    async fn initialize_async(&self, cancel: &CancellationToken) -> Result<usize, BankError> {
        Bank::initialize_async(self, cancel).await
    }
}

struct Entry {
    type_id: TypeId,
    erased: Arc<dyn ErasedBank>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Bank lookup by record type.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
    notations: Arc<RwLock<Vec<BankInfo>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.entries.iter().map(|e| e.erased.bank_id()).collect();
        f.debug_struct("Registry").field("banks", &ids).finish()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bank for `R`. Returns the shared handle.
    pub fn register<R: Record>(&mut self, bank: Bank<R>) -> Result<Arc<Bank<R>>, BankError> {
        let bank = Arc::new(bank);
        let type_id = TypeId::of::<R>();
        if self.entries.iter().any(|e| e.type_id == type_id) {
            return Err(BankError::AlreadyRegistered(bank.record_type().to_string()));
        }

        let index = {
            let mut notations = self.notations.write().unwrap_or_else(PoisonError::into_inner);
            notations.push(bank.info());
            notations.len().saturating_sub(1)
        };
        let notations = Arc::clone(&self.notations);
        bank.subscribe(move |event| refresh_notation(&notations, index, event));

        tracing::debug!(bank = %bank.id(), "bank registered");
        self.entries.push(Entry {
            type_id,
            erased: bank.clone(),
            typed: bank.clone(),
        });
        Ok(bank)
    }

    /// Typed handle to the bank for `R`.
    pub fn resolve<R: Record>(&self) -> Result<Arc<Bank<R>>, BankError> {
        let type_id = TypeId::of::<R>();
        self.entries
            .iter()
            .find(|e| e.type_id == type_id)
            .and_then(|e| Arc::clone(&e.typed).downcast::<Bank<R>>().ok())
            .ok_or_else(|| BankError::UnregisteredType(std::any::type_name::<R>().to_string()))
    }

    /// Initialize every bank in registration order, stopping at the first
    /// failure. Returns the total number of records loaded.
    pub fn initialize(&self) -> Result<usize, BankError> {
        let mut total = 0usize;
        for entry in &self.entries {
            total = total.saturating_add(entry.erased.initialize()?);
        }
        tracing::info!(banks = self.entries.len(), records = total, "registry initialized");
        Ok(total)
    }

    /// Asynchronous `initialize`.
    pub async fn initialize_async(&self, cancel: &CancellationToken) -> Result<usize, BankError> {
        let mut total = 0usize;
        for entry in &self.entries {
            total = total.saturating_add(entry.erased.initialize_async(cancel).await?);
        }
        tracing::info!(banks = self.entries.len(), records = total, "registry initialized");
        Ok(total)
    }

    /// Current notation of every bank, in registration order.
    #[must_use]
    pub fn notations(&self) -> Vec<BankInfo> {
        self.notations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn refresh_notation<R>(notations: &RwLock<Vec<BankInfo>>, index: usize, event: &BankEvent<R>) {
    let mut notations = notations.write().unwrap_or_else(PoisonError::into_inner);
    let Some(notation) = notations.get_mut(index) else {
        return;
    };
    match event {
        BankEvent::DataUpdated { count, .. } => notation.count = *count,
        BankEvent::InfoUpdated(info) => {
            notation.name.clone_from(&info.name);
            notation.description.clone_from(&info.description);
            notation.count = info.count;
        }
        BankEvent::DataAdded(_) | BankEvent::DataDropped(_) => {}
    }
}
