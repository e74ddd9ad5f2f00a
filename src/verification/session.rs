//! Verification Session Store
//!
//! Pending applicants live in memory only and are removed on approval or
//! decline. While a record exists, `attempts < max_attempts`.
//!
//! The approve/decline call is the only step that awaits the network, so it
//! is claimed under the lock first (`deciding`). At most one answer per
//! applicant can be turned into a platform decision at a time.

use super::challenge::ChallengeSpec;
use crate::telegram::traits::{ChatId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of answers an applicant gets
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Applicant waiting for their answer to be checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingApplicant {
    pub applicant: UserId,
    /// Private chat used to talk to the applicant
    pub user_chat: ChatId,
    pub challenge: ChallengeSpec,
    /// Wrong answers so far
    pub attempts: u32,
    /// An approve/decline call for this applicant is in flight
    pub deciding: bool,
}

/// Result of recording a wrong answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedAttempt {
    /// Record updated; the applicant may answer again
    Retry { attempts: u32, remaining: u32 },
    /// This answer used the last attempt and the decline is now claimed.
    /// `attempts` on the record is left as it was.
    Exhausted { attempts: u32 },
    /// Another answer is being decided; this one was not counted
    Deciding,
}

/// Result of claiming the terminal decision for an applicant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionClaim {
    /// The caller owns the decision; snapshot taken under the claim
    Claimed(PendingApplicant),
    /// Another answer already holds the claim
    Deciding,
}

/// Applicant -> pending challenge
///
/// Cloning shares the underlying map. Every read-modify-write happens under a
/// single lock acquisition, so concurrent answers cannot lose an increment.
#[derive(Debug, Clone)]
pub struct VerificationSessionStore {
    applicants: Arc<Mutex<HashMap<UserId, PendingApplicant>>>,
    max_attempts: u32,
}

impl VerificationSessionStore {
    /// Create a store; `max_attempts` is clamped to at least 1
    pub fn new(max_attempts: u32) -> Self {
        Self {
            applicants: Arc::new(Mutex::new(HashMap::new())),
            max_attempts: max_attempts.max(1),
        }
    }

    fn applicants(&self) -> MutexGuard<'_, HashMap<UserId, PendingApplicant>> {
        self.applicants.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Insert a new pending applicant with zero attempts.
    ///
    /// Returns `false` (and keeps the existing record) if one is already pending.
    pub fn create(&self, applicant: UserId, user_chat: ChatId, challenge: ChallengeSpec) -> bool {
        let mut applicants = self.applicants();
        if applicants.contains_key(&applicant) {
            return false;
        }
        applicants.insert(
            applicant,
            PendingApplicant {
                applicant,
                user_chat,
                challenge,
                attempts: 0,
                deciding: false,
            },
        );
        true
    }

    /// Snapshot of a pending applicant
    pub fn get(&self, applicant: UserId) -> Option<PendingApplicant> {
        self.applicants().get(&applicant).cloned()
    }

    /// Claim the approve/decline decision. `None` if the applicant has no record.
    pub fn begin_decision(&self, applicant: UserId) -> Option<DecisionClaim> {
        let mut applicants = self.applicants();
        let pending = applicants.get_mut(&applicant)?;

        if pending.deciding {
            return Some(DecisionClaim::Deciding);
        }
        pending.deciding = true;
        Some(DecisionClaim::Claimed(pending.clone()))
    }

    /// Release a claim after a failed platform call, leaving the record as it
    /// was before the claim
    pub fn abandon_decision(&self, applicant: UserId) {
        if let Some(pending) = self.applicants().get_mut(&applicant) {
            pending.deciding = false;
        }
    }

    /// Record a wrong answer. `None` if the applicant has no record.
    ///
    /// The answer that exhausts the attempts claims the decline decision.
    pub fn register_failure(&self, applicant: UserId) -> Option<FailedAttempt> {
        let mut applicants = self.applicants();
        let pending = applicants.get_mut(&applicant)?;

        if pending.deciding {
            return Some(FailedAttempt::Deciding);
        }

        let next = pending.attempts + 1;
        if next < self.max_attempts {
            pending.attempts = next;
            Some(FailedAttempt::Retry {
                attempts: next,
                remaining: self.max_attempts - next,
            })
        } else {
            pending.deciding = true;
            Some(FailedAttempt::Exhausted { attempts: next })
        }
    }

    /// Remove a record (approval, decline, or undeliverable challenge)
    pub fn remove(&self, applicant: UserId) -> Option<PendingApplicant> {
        self.applicants().remove(&applicant)
    }

    /// Number of applicants currently pending
    pub fn active_count(&self) -> usize {
        self.applicants().len()
    }
}

impl Default for VerificationSessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPLICANT: UserId = UserId(5);

    fn store_with_applicant() -> VerificationSessionStore {
        let store = VerificationSessionStore::default();
        assert!(store.create(APPLICANT, ChatId(5), ChallengeSpec::arithmetic(2, 2).unwrap()));
        store
    }

    #[test]
    fn test_create_starts_at_zero_attempts() {
        let store = store_with_applicant();

        let pending = store.get(APPLICANT).unwrap();
        assert_eq!(pending.attempts, 0);
        assert_eq!(pending.user_chat, ChatId(5));
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn test_duplicate_create_keeps_existing_record() {
        let store = store_with_applicant();
        store.register_failure(APPLICANT);

        assert!(!store.create(APPLICANT, ChatId(5), ChallengeSpec::free_text()));
        let pending = store.get(APPLICANT).unwrap();
        assert_eq!(pending.attempts, 1);
        assert_eq!(pending.challenge, ChallengeSpec::arithmetic(2, 2).unwrap());
    }

    #[test]
    fn test_failures_count_down_then_exhaust() {
        let store = store_with_applicant();

        assert_eq!(
            store.register_failure(APPLICANT),
            Some(FailedAttempt::Retry {
                attempts: 1,
                remaining: 2
            })
        );
        assert_eq!(
            store.register_failure(APPLICANT),
            Some(FailedAttempt::Retry {
                attempts: 2,
                remaining: 1
            })
        );
        assert_eq!(
            store.register_failure(APPLICANT),
            Some(FailedAttempt::Exhausted { attempts: 3 })
        );
        // Exhaustion does not push the record past the limit
        let pending = store.get(APPLICANT).unwrap();
        assert_eq!(pending.attempts, 2);
        assert!(pending.deciding);
    }

    #[test]
    fn test_only_one_decision_claim() {
        let store = store_with_applicant();

        let claim = store.begin_decision(APPLICANT).unwrap();
        assert!(matches!(claim, DecisionClaim::Claimed(ref p) if p.attempts == 0));
        assert_eq!(store.begin_decision(APPLICANT), Some(DecisionClaim::Deciding));
        assert_eq!(store.register_failure(APPLICANT), Some(FailedAttempt::Deciding));
        assert_eq!(store.get(APPLICANT).unwrap().attempts, 0);
    }

    #[test]
    fn test_exhausting_answer_blocks_approval() {
        let store = VerificationSessionStore::new(1);
        store.create(APPLICANT, ChatId(5), ChallengeSpec::arithmetic(2, 2).unwrap());

        assert_eq!(
            store.register_failure(APPLICANT),
            Some(FailedAttempt::Exhausted { attempts: 1 })
        );
        assert_eq!(store.begin_decision(APPLICANT), Some(DecisionClaim::Deciding));
    }

    #[test]
    fn test_abandoned_claim_restores_record() {
        let store = store_with_applicant();
        store.register_failure(APPLICANT);
        let before = store.get(APPLICANT).unwrap();

        store.begin_decision(APPLICANT);
        store.abandon_decision(APPLICANT);

        assert_eq!(store.get(APPLICANT).unwrap(), before);
        assert!(matches!(
            store.begin_decision(APPLICANT),
            Some(DecisionClaim::Claimed(_))
        ));
    }

    #[test]
    fn test_claim_without_record() {
        let store = VerificationSessionStore::default();
        assert_eq!(store.begin_decision(APPLICANT), None);
        store.abandon_decision(APPLICANT);
    }

    #[test]
    fn test_concurrent_claims_grant_one() {
        let store = store_with_applicant();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    matches!(store.begin_decision(APPLICANT), Some(DecisionClaim::Claimed(_)))
                })
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|claimed| *claimed)
            .count();

        assert_eq!(granted, 1);
    }

    #[test]
    fn test_failure_without_record() {
        let store = VerificationSessionStore::default();
        assert_eq!(store.register_failure(APPLICANT), None);
    }

    #[test]
    fn test_single_attempt_store() {
        let store = VerificationSessionStore::new(0);
        assert_eq!(store.max_attempts(), 1);

        store.create(APPLICANT, ChatId(5), ChallengeSpec::free_text());
        assert_eq!(
            store.register_failure(APPLICANT),
            Some(FailedAttempt::Exhausted { attempts: 1 })
        );
    }

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let store = VerificationSessionStore::new(100);
        store.create(APPLICANT, ChatId(5), ChallengeSpec::free_text());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.register_failure(APPLICANT);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(APPLICANT).unwrap().attempts, 10);
    }

    #[test]
    fn test_remove() {
        let store = store_with_applicant();
        assert!(store.remove(APPLICANT).is_some());
        assert!(store.remove(APPLICANT).is_none());
        assert_eq!(store.active_count(), 0);
    }
}
