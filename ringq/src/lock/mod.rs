//! Distributed lock
//!
//! A spin-acquire mutual-exclusion lock keyed by name. The stored value is
//! `<owner uuid>:<expiry epoch millis>`. A free key is taken with SETNX; an
//! expired (or our own) record is taken over with GETSET, and the takeover
//! only counts when the value GETSET returned is the value we read just
//! before, so among racers that saw the same stale record exactly one wins.

use crate::config::LockConfig;
use crate::observability::RingqMetrics;
use crate::storage::Store;
use crate::task::now_millis;
use crate::Result;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Parsed lock record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRecord {
    /// Owner token
    pub owner: Uuid,
    /// Absolute expiry time (epoch millis)
    pub expiry_millis: i64,
}

impl LockRecord {
    /// Record returned for anything unparsable; always expired
    pub const NONE: LockRecord = LockRecord {
        owner: Uuid::nil(),
        expiry_millis: 0,
    };

    /// Create a record
    pub fn new(owner: Uuid, expiry_millis: i64) -> Self {
        Self { owner, expiry_millis }
    }

    /// Parse `owner:expiry`, falling back to [`LockRecord::NONE`]
    pub fn parse(text: &str) -> Self {
        let Some((owner, expiry)) = text.split_once(':') else {
            return Self::NONE;
        };
        match (Uuid::parse_str(owner), expiry.parse::<i64>()) {
            (Ok(owner), Ok(expiry_millis)) => Self { owner, expiry_millis },
            _ => Self::NONE,
        }
    }

    /// Check whether the record expired before `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry_millis < now
    }

    /// Check whether the record belongs to `owner`
    pub fn is_owned_by(&self, owner: &Uuid) -> bool {
        self.owner == *owner
    }

    /// Expired, or ours: either way we may take it over
    pub fn is_expired_or_owned_by(&self, owner: &Uuid, now: i64) -> bool {
        self.is_expired(now) || self.is_owned_by(owner)
    }
}

impl fmt::Display for LockRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.expiry_millis)
    }
}

/// Distributed lock
///
/// One value per holder; it is not shared between tasks. Dropping an
/// `acquire` future cancels the attempt.
///
/// # Examples
///
/// ```rust,no_run
/// use ringq::lock::DistributedLock;
/// use ringq::config::LockConfig;
/// use ringq::storage::MemoryStore;
/// use std::sync::Arc;
///
/// # async fn example() -> ringq::Result<()> {
/// let store = Arc::new(MemoryStore::new());
/// let mut lock = DistributedLock::new(store, "reports", LockConfig::default())?;
/// if lock.acquire().await? {
///     // exclusive section
///     lock.release().await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct DistributedLock {
    store: Arc<dyn Store>,
    key: String,
    owner: Uuid,
    config: LockConfig,
    held: Option<LockRecord>,
    metrics: Option<RingqMetrics>,
}

impl DistributedLock {
    /// Create a lock with a random owner token
    pub fn new(store: Arc<dyn Store>, key: impl Into<String>, config: LockConfig) -> Result<Self> {
        Self::with_owner(store, key, config, Uuid::new_v4())
    }

    /// Create a lock with an explicit owner token
    pub fn with_owner(
        store: Arc<dyn Store>,
        key: impl Into<String>,
        config: LockConfig,
        owner: Uuid,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            key: key.into(),
            owner,
            config,
            held: None,
            metrics: None,
        })
    }

    /// Count acquisitions in the given collector
    #[must_use]
    pub fn with_metrics(mut self, metrics: RingqMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spin until the lock is ours or the acquire timeout runs out
    ///
    /// Contention is `Ok(false)`; store failures are errors.
    pub async fn acquire(&mut self) -> Result<bool> {
        let resolution = self.config.resolution;
        let step = i64::try_from(resolution.as_millis()).unwrap_or(i64::MAX);
        let mut remaining = i64::try_from(self.config.acquire_timeout.as_millis()).unwrap_or(i64::MAX);

        loop {
            if self.try_acquire_once().await? {
                if let Some(metrics) = &self.metrics {
                    metrics.record_lock_acquired(&self.key);
                }
                tracing::debug!("Lock {} acquired by {}", self.key, self.owner);
                return Ok(true);
            }

            remaining = remaining.saturating_sub(step);
            if remaining < 0 {
                break;
            }
            tokio::time::sleep(resolution).await;
        }

        tracing::debug!("Lock {} not acquired by {} within {:?}",
            self.key, self.owner, self.config.acquire_timeout);
        Ok(false)
    }

    async fn try_acquire_once(&mut self) -> Result<bool> {
        let expiry = i64::try_from(self.config.expiry.as_millis()).unwrap_or(i64::MAX);
        let candidate = LockRecord::new(self.owner, now_millis().saturating_add(expiry));
        let value = candidate.to_string();

        if self.store.set_nx(&self.key, &value).await? {
            self.held = Some(candidate);
            return Ok(true);
        }

        let current_value = self.store.get(&self.key).await?;
        let current = current_value
            .as_deref()
            .map(LockRecord::parse)
            .unwrap_or(LockRecord::NONE);

        if current.is_expired_or_owned_by(&self.owner, now_millis()) {
            let previous = self.store.get_set(&self.key, &value).await?;
            if previous.is_none() || previous == current_value {
                self.held = Some(candidate);
                return Ok(true);
            }
            tracing::warn!("Lock {} fenced: another owner swapped in first", self.key);
        }

        Ok(false)
    }

    /// Re-acquire when the stored record is expired or ours
    ///
    /// A live record of another owner fails at once. An expired record of
    /// another owner is taken over like a fresh `acquire`.
    pub async fn renew(&mut self) -> Result<bool> {
        let current = self
            .store
            .get(&self.key)
            .await?
            .as_deref()
            .map(LockRecord::parse)
            .unwrap_or(LockRecord::NONE);

        if !current.is_expired_or_owned_by(&self.owner, now_millis()) {
            return Ok(false);
        }
        self.acquire().await
    }

    /// Release the lock if held
    ///
    /// When our own record already expired, the key is deleted only if the
    /// store still names us as owner.
    pub async fn release(&mut self) -> Result<()> {
        let Some(held) = self.held else {
            return Ok(());
        };

        if held.is_expired(now_millis()) {
            let current = self
                .store
                .get(&self.key)
                .await?
                .as_deref()
                .map(LockRecord::parse)
                .unwrap_or(LockRecord::NONE);

            if !current.is_owned_by(&self.owner) {
                tracing::warn!("Lock {} expired and now belongs to {}, not deleting",
                    self.key, current.owner);
                self.held = None;
                return Ok(());
            }
        }

        self.store.del(&self.key).await?;
        self.held = None;
        tracing::debug!("Lock {} released by {}", self.key, self.owner);
        Ok(())
    }

    /// Check whether this handle currently holds the lock
    pub fn is_locked(&self) -> bool {
        self.held.is_some()
    }

    /// Lock key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Owner token
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Expiry of the held record, if any
    pub fn expiry_millis(&self) -> Option<i64> {
        self.held.map(|record| record.expiry_millis)
    }

    /// Configuration in use
    pub fn config(&self) -> &LockConfig {
        &self.config
    }
}

impl fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLock")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("held", &self.held)
            .finish()
    }
}
