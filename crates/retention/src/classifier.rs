//! Tiered retention: which backups survive a rotation
//!
//! Records arrive newest-first. Each one is offered to the daily, weekly and
//! monthly tiers in that order; the first tier that still has room and has
//! not yet seen the record's bucket keeps it. A record kept by one tier is
//! never counted by another. Everything else with a known timestamp is
//! deleted, and records without one are left alone.

use crate::bucket::{bucket_key_for, BucketKey, Granularity};
use crate::record::Timestamped;
use std::fmt;

/// Keep-counts for each tier
///
/// A count of zero disables the tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Distinct days to keep
    pub daily_keep: usize,
    /// Distinct ISO weeks to keep
    pub weekly_keep: usize,
    /// Distinct months to keep
    pub monthly_keep: usize,
}

impl RetentionPolicy {
    pub fn new(daily_keep: usize, weekly_keep: usize, monthly_keep: usize) -> Self {
        Self {
            daily_keep,
            weekly_keep,
            monthly_keep,
        }
    }

    /// Upper bound on the number of records a rotation can keep
    pub fn max_kept(&self) -> usize {
        self.daily_keep + self.weekly_keep + self.monthly_keep
    }

    fn keep_count(&self, tier: Tier) -> usize {
        match tier {
            Tier::Daily => self.daily_keep,
            Tier::Weekly => self.weekly_keep,
            Tier::Monthly => self.monthly_keep,
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "daily={} weekly={} monthly={}",
            self.daily_keep, self.weekly_keep, self.monthly_keep
        )
    }
}

/// Retention tier, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Daily,
    Weekly,
    Monthly,
}

impl Tier {
    /// All tiers in the order records are offered to them
    pub const ALL: [Tier; 3] = [Tier::Daily, Tier::Weekly, Tier::Monthly];

    pub fn granularity(self) -> Granularity {
        match self {
            Tier::Daily => Granularity::Day,
            Tier::Weekly => Granularity::Week,
            Tier::Monthly => Granularity::Month,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Daily => "daily",
            Tier::Weekly => "weekly",
            Tier::Monthly => "monthly",
        };
        f.write_str(name)
    }
}

/// A record that survived rotation, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kept<R> {
    pub record: R,
    pub tier: Tier,
    pub bucket: BucketKey,
}

/// Outcome of one classification
///
/// `keep` and `delete` partition the records that carry a timestamp;
/// `unparsed` holds the rest, which must never be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionDecision<R> {
    pub keep: Vec<Kept<R>>,
    pub delete: Vec<R>,
    pub unparsed: Vec<R>,
}

impl<R> RetentionDecision<R> {
    fn empty() -> Self {
        Self {
            keep: Vec::new(),
            delete: Vec::new(),
            unparsed: Vec::new(),
        }
    }

    /// True when no records were classified at all
    pub fn is_empty(&self) -> bool {
        self.keep.is_empty() && self.delete.is_empty() && self.unparsed.is_empty()
    }

    /// Total number of records classified
    pub fn len(&self) -> usize {
        self.keep.len() + self.delete.len() + self.unparsed.len()
    }

    /// Iterate over the kept records, newest first
    pub fn kept_records(&self) -> impl Iterator<Item = &R> {
        self.keep.iter().map(|kept| &kept.record)
    }
}

/// Distinct bucket keys claimed by one tier, capped at its keep-count
struct TierSlots {
    tier: Tier,
    capacity: usize,
    keys: Vec<BucketKey>,
}

impl TierSlots {
    fn new(tier: Tier, capacity: usize) -> Self {
        Self {
            tier,
            capacity,
            keys: Vec::with_capacity(capacity.min(64)),
        }
    }

    /// Claim `key` if the tier has room and has not seen it yet
    fn try_claim(&mut self, key: BucketKey) -> bool {
        if self.keys.len() >= self.capacity || self.keys.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }
}

/// Stateless retention classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    policy: RetentionPolicy,
}

impl Classifier {
    /// Create a classifier for the given policy
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Partition newest-first `records` into keep and delete sets
    ///
    /// Callers supply the order; records with equal timestamps are decided by
    /// their position in the input.
    pub fn classify<R, I>(&self, records: I) -> RetentionDecision<R>
    where
        R: Timestamped,
        I: IntoIterator<Item = R>,
    {
        let mut slots = Tier::ALL.map(|tier| TierSlots::new(tier, self.policy.keep_count(tier)));
        let mut decision = RetentionDecision::empty();

        for record in records {
            let Some(captured_at) = record.captured_at() else {
                decision.unparsed.push(record);
                continue;
            };

            let claimed = slots.iter_mut().find_map(|slot| {
                let key = bucket_key_for(captured_at, slot.tier.granularity());
                slot.try_claim(key).then_some((slot.tier, key))
            });

            match claimed {
                Some((tier, bucket)) => decision.keep.push(Kept {
                    record,
                    tier,
                    bucket,
                }),
                None => decision.delete.push(record),
            }
        }

        tracing::debug!(
            kept = decision.keep.len(),
            deleted = decision.delete.len(),
            unparsed = decision.unparsed.len(),
            "Classified backups ({})",
            self.policy
        );

        decision
    }
}
