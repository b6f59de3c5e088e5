//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//! Every command loads the registry first, then works through the async
//! bank API.

use super::OrderKey;
use crate::backends::contacts_bank;
use crate::{AppError, Config, Contact};
use databank_core::primitives::{ORDER_ASCENDING, ORDER_DESCENDING};
use databank_core::{Bank, Explorable, KeyOrdering, Registry, SelectingFilter};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// CONTEXT
// =============================================================================

/// Resolved configuration plus the registry holding every bank.
#[derive(Debug)]
pub struct Context {
    config: Config,
    registry: Registry,
    json_mode: bool,
    cancel: CancellationToken,
}

impl Context {
    /// Assemble banks for `config` and register them. Nothing is read yet.
    pub fn open(config: Config, json_mode: bool) -> Result<Self, AppError> {
        let mut registry = Registry::new();
        registry.register(contacts_bank(&config)?)?;
        Ok(Self {
            config,
            registry,
            json_mode,
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Token passed to every async bank call.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn contacts(&self) -> Result<Arc<Bank<Contact>>, AppError> {
        Ok(self.registry.resolve::<Contact>()?)
    }

    /// Initialize every registered bank.
    pub async fn load(&self) -> Result<usize, AppError> {
        Ok(self.registry.initialize_async(&self.cancel).await?)
    }

    /// Print `value` as pretty JSON in JSON mode, otherwise run `human`.
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> Result<(), AppError> {
        if self.json_mode {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create the storage if needed and load it once.
pub async fn cmd_init(ctx: &Context) -> Result<(), AppError> {
    std::fs::create_dir_all(&ctx.config().data_dir)?;
    let loaded = ctx.load().await?;
    let bank = ctx.contacts()?;
    tracing::info!(backend = %ctx.config().backend, loaded, "storage initialized");

    let output = serde_json::json!({
        "data_dir": ctx.config().data_dir.display().to_string(),
        "backend": ctx.config().backend.to_string(),
        "source": bank.reader_source(),
        "loaded": loaded,
    });
    ctx.emit(&output, || {
        println!(
            "Initialized {} backend at {:?} ({} records loaded)",
            ctx.config().backend,
            ctx.config().data_dir,
            loaded
        );
    })
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show bank notations and counts.
pub async fn cmd_status(ctx: &Context) -> Result<(), AppError> {
    ctx.load().await?;
    let bank = ctx.contacts()?;
    let notations = ctx.registry().notations();

    let output = serde_json::json!({
        "data_dir": ctx.config().data_dir.display().to_string(),
        "backend": ctx.config().backend.to_string(),
        "drop_strategy": bank.drop_strategy().to_string(),
        "banks": notations,
        "contacts": {
            "count": bank.count(),
            "count_all": bank.count_all(),
        },
    });
    ctx.emit(&output, || {
        println!("Databank Status");
        println!("===============");
        println!("Data dir: {:?}", ctx.config().data_dir);
        println!("Backend:  {}", ctx.config().backend);
        println!("Drop:     {}", bank.drop_strategy());
        println!();
        for info in &notations {
            println!(
                "{:<12} {:>6} active  {}",
                info.name,
                info.count,
                info.description.as_deref().unwrap_or("")
            );
        }
        println!();
        println!("Contacts: {} active / {} stored", bank.count(), bank.count_all());
    })
}

// =============================================================================
// LIST COMMAND
// =============================================================================

/// Build the contact view used by `list`.
pub fn contact_view(
    bank: Arc<Bank<Contact>>,
    all: bool,
    filter: Option<String>,
    order: Option<OrderKey>,
    desc: bool,
) -> Result<Explorable<Contact>, AppError> {
    let mut view = if all {
        Explorable::from_retriever(move || bank.all_readonly_data())
    } else {
        Explorable::from_bank(bank)
    };

    if let Some(text) = filter {
        view.add_filter(SelectingFilter::new("text", move |c: &Contact| c.matches(&text)).enabled())?;
    }
    view.add_ordering(KeyOrdering::new("id", |c: &Contact| c.id))?;
    view.add_ordering(KeyOrdering::new("name", |c: &Contact| c.name.to_lowercase()))?;
    view.add_ordering(KeyOrdering::new("email", |c: &Contact| c.email.to_lowercase()))?;

    if let Some(key) = order {
        let id = match key {
            OrderKey::Id => "id",
            OrderKey::Name => "name",
            OrderKey::Email => "email",
        };
        let state = if desc { ORDER_DESCENDING } else { ORDER_ASCENDING };
        view.switch(id, Some(state))?;
    }
    Ok(view)
}

/// List contacts.
pub async fn cmd_list(
    ctx: &Context,
    all: bool,
    filter: Option<String>,
    order: Option<OrderKey>,
    desc: bool,
) -> Result<(), AppError> {
    ctx.load().await?;
    let mut view = contact_view(ctx.contacts()?, all, filter, order, desc)?;
    let contacts = view.explore();

    ctx.emit(&contacts, || {
        if contacts.is_empty() {
            println!("No contacts.");
        }
        for contact in &contacts {
            let marker = if contact.enabled { "" } else { "  [dropped]" };
            println!("{:>5}  {}{}", contact.id, contact, marker);
        }
    })
}

// =============================================================================
// ADD COMMAND
// =============================================================================

/// Save a new contact.
pub async fn cmd_add(ctx: &Context, name: String, email: String) -> Result<(), AppError> {
    ctx.load().await?;
    let bank = ctx.contacts()?;

    let mut contact = bank.build_new_data()?;
    contact.name = name;
    contact.email = email;
    bank.update_save_async(&mut contact, ctx.cancel_token()).await?;
    tracing::info!(id = contact.id, "contact added");

    ctx.emit(&contact, || println!("Added #{}: {}", contact.id, contact))
}

// =============================================================================
// DROP COMMAND
// =============================================================================

/// Drop contacts by id or by exact name.
pub async fn cmd_drop(ctx: &Context, id: Option<i64>, name: Option<String>) -> Result<(), AppError> {
    ctx.load().await?;
    let bank = ctx.contacts()?;
    let cancel = ctx.cancel_token();

    let dropped = match (id, name) {
        (Some(id), _) => {
            let mut contact = bank.get(&id)?;
            usize::from(bank.drop_save_async(&mut contact, cancel).await?)
        }
        (None, Some(name)) => {
            bank.drop_save_where_async(move |c: &Contact| c.name == name, cancel)
                .await?
        }
        (None, None) => {
            return Err(AppError::Usage("drop needs --id or --name".to_string()));
        }
    };
    tracing::info!(dropped, strategy = %bank.drop_strategy(), "contacts dropped");

    let output = serde_json::json!({
        "dropped": dropped,
        "strategy": bank.drop_strategy().to_string(),
        "count": bank.count(),
    });
    ctx.emit(&output, || {
        println!(
            "Dropped {} contact(s) ({}); {} active",
            dropped,
            bank.drop_strategy(),
            bank.count()
        );
    })
}

// =============================================================================
// TOUCH COMMAND
// =============================================================================

/// Re-persist a stored contact without changing it.
pub async fn cmd_touch(ctx: &Context, id: i64) -> Result<(), AppError> {
    ctx.load().await?;
    let bank = ctx.contacts()?;

    let contact = bank.get(&id)?;
    bank.request_save_async(&contact, ctx.cancel_token()).await?;

    ctx.emit(&contact, || println!("Rewrote #{}: {}", contact.id, contact))
}
