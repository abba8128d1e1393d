//! Transaction reference tokens.
//!
//! A reference looks like `TRANSACTION_CREDIT_7Q2K0ZB4MX`: an upper-cased
//! namespace, an underscore, and a fixed-length suffix drawn from `0-9A-Z`.
//! Ten characters give 36^10 (about 3.6e15) combinations, so the uniqueness
//! check nearly always passes on the first draw. The loop is still bounded.

use std::{fmt, sync::Arc};

use rand::Rng;
use sea_orm::{ConnectionTrait, QueryFilter, prelude::*};

use crate::{ResultEngine, transactions};

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub const DEFAULT_SUFFIX_LEN: usize = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Source of random reference suffixes.
pub trait SuffixSource: Send + Sync {
    fn suffix(&self, len: usize) -> String;
}

/// Default source backed by the thread-local RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlphanumericSuffix;

impl SuffixSource for AlphanumericSuffix {
    fn suffix(&self, len: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
            .collect()
    }
}

/// Result of a bounded generation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceOutcome {
    Unique(String),
    ExhaustedRetries { attempts: u32 },
}

#[derive(Clone)]
pub struct ReferenceGenerator {
    source: Arc<dyn SuffixSource>,
    suffix_len: usize,
    max_attempts: u32,
}

impl fmt::Debug for ReferenceGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceGenerator")
            .field("suffix_len", &self.suffix_len)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl Default for ReferenceGenerator {
    fn default() -> Self {
        Self::new(Arc::new(AlphanumericSuffix))
    }
}

impl ReferenceGenerator {
    pub fn new(source: Arc<dyn SuffixSource>) -> Self {
        Self {
            source,
            suffix_len: DEFAULT_SUFFIX_LEN,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Suffix length; values below `DEFAULT_SUFFIX_LEN` are raised to it.
    #[must_use]
    pub fn suffix_len(mut self, len: usize) -> Self {
        self.suffix_len = len.max(DEFAULT_SUFFIX_LEN);
        self
    }

    /// Maximum number of candidates checked per call; values below 1 are raised to 1.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Build one candidate token (no uniqueness check).
    pub fn candidate(&self, namespace: &str) -> String {
        format!(
            "{}_{}",
            namespace.trim().to_uppercase(),
            self.source.suffix(self.suffix_len)
        )
    }

    /// Draw candidates until one is not used by any transaction.
    ///
    /// `db` should be the caller's open transaction so the check sees the
    /// same snapshot the insert will run against.
    pub async fn generate<C>(&self, db: &C, namespace: &str) -> ResultEngine<ReferenceOutcome>
    where
        C: ConnectionTrait,
    {
        for attempt in 1..=self.max_attempts {
            let candidate = self.candidate(namespace);
            let taken = transactions::Entity::find()
                .filter(transactions::Column::Reference.eq(candidate.as_str()))
                .one(db)
                .await?
                .is_some();
            if !taken {
                return Ok(ReferenceOutcome::Unique(candidate));
            }
            tracing::debug!(attempt, reference = %candidate, "reference collision, regenerating");
        }
        Ok(ReferenceOutcome::ExhaustedRetries {
            attempts: self.max_attempts,
        })
    }
}
