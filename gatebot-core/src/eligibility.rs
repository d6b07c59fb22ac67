//! Referral and reward eligibility rules.
//!
//! Everything here is a pure function over a loaded [`UserDocument`]. Callers
//! load the document, apply one of these operations, and commit the result
//! through the store; a rejected operation leaves the document untouched so
//! there is nothing to write.

use crate::model::{UserDocument, UserId, UserRecord};

/// Number of distinct referrals needed to unlock the reward.
pub const REFERRAL_QUOTA: usize = 3;

/// Result of trying to record a referral edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralOutcome {
    /// The edge was recorded. `referral_count` is the referrer's new total.
    Applied { referral_count: usize },
    /// Referrer and referee are the same user.
    SelfReferral,
    /// No record exists for the referrer.
    ReferrerUnknown,
    /// No record exists for the referee.
    RefereeUnknown,
    /// The referee is already in the referrer's list or was referred before.
    AlreadyReferred,
    /// The referee is an ancestor of the referrer.
    WouldCycle,
}

impl ReferralOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReferralOutcome::Applied { .. })
    }
}

/// Result of a withdrawal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// First successful withdrawal; `has_withdrawn` flipped to true.
    Unlocked,
    /// The reward was unlocked earlier. Nothing changes.
    AlreadyUnlocked,
    NotEligible { remaining: usize },
    UnknownUser,
}

impl WithdrawOutcome {
    /// Whether the reward payload may be shown.
    pub fn reveals_reward(&self) -> bool {
        matches!(
            self,
            WithdrawOutcome::Unlocked | WithdrawOutcome::AlreadyUnlocked
        )
    }
}

/// Insert a default record for `user_id` if there is none.
///
/// Returns true when a record was created. Existing records are left exactly
/// as they are, display name included.
pub fn register_user(doc: &mut UserDocument, user_id: UserId, display_name: Option<&str>) -> bool {
    if doc.users.contains_key(&user_id) {
        return false;
    }
    doc.users
        .insert(user_id, UserRecord::new(user_id, display_name));
    true
}

/// Record `referee_id` as recruited by `referrer_id`.
///
/// Both users must exist. The edge is refused when it would make the user a
/// referee twice (`referred_by` is write-once) or close a loop in the referral
/// forest. Rejections never mutate the document.
pub fn record_referral(
    doc: &mut UserDocument,
    referrer_id: UserId,
    referee_id: UserId,
) -> ReferralOutcome {
    if referrer_id == referee_id {
        return ReferralOutcome::SelfReferral;
    }
    let Some(referrer) = doc.users.get(&referrer_id) else {
        return ReferralOutcome::ReferrerUnknown;
    };
    if referrer.referrals.contains(&referee_id) {
        return ReferralOutcome::AlreadyReferred;
    }
    let Some(referee) = doc.users.get(&referee_id) else {
        return ReferralOutcome::RefereeUnknown;
    };
    if referee.referred_by.is_some() {
        return ReferralOutcome::AlreadyReferred;
    }
    if is_ancestor(doc, referee_id, referrer_id) {
        return ReferralOutcome::WouldCycle;
    }

    if let Some(referee) = doc.users.get_mut(&referee_id) {
        referee.referred_by = Some(referrer_id);
    }
    let referral_count = match doc.users.get_mut(&referrer_id) {
        Some(referrer) => {
            referrer.referrals.push(referee_id);
            referrer.referrals.len()
        }
        None => 0,
    };
    ReferralOutcome::Applied { referral_count }
}

/// Walk `referred_by` links upwards from `start`, looking for `candidate`.
///
/// Bounded by the number of users so a corrupted document with a loop in it
/// cannot hang the walk.
fn is_ancestor(doc: &UserDocument, candidate: UserId, start: UserId) -> bool {
    let mut current = doc.users.get(&start).and_then(|r| r.referred_by);
    let mut steps = 0;
    while let Some(id) = current {
        if id == candidate {
            return true;
        }
        steps += 1;
        if steps > doc.users.len() {
            return true;
        }
        current = doc.users.get(&id).and_then(|r| r.referred_by);
    }
    false
}

pub fn referral_count(doc: &UserDocument, user_id: UserId) -> usize {
    doc.users
        .get(&user_id)
        .map(|r| r.referrals.len())
        .unwrap_or(0)
}

pub fn remaining_referrals(doc: &UserDocument, user_id: UserId) -> usize {
    REFERRAL_QUOTA.saturating_sub(referral_count(doc, user_id))
}

pub fn is_eligible_to_withdraw(doc: &UserDocument, user_id: UserId) -> bool {
    referral_count(doc, user_id) >= REFERRAL_QUOTA
}

/// Unlock the reward for `user_id` if the quota is met.
pub fn mark_withdrawn(doc: &mut UserDocument, user_id: UserId) -> WithdrawOutcome {
    let Some(record) = doc.users.get_mut(&user_id) else {
        return WithdrawOutcome::UnknownUser;
    };
    if record.has_withdrawn {
        return WithdrawOutcome::AlreadyUnlocked;
    }
    if record.referrals.len() < REFERRAL_QUOTA {
        return WithdrawOutcome::NotEligible {
            remaining: REFERRAL_QUOTA - record.referrals.len(),
        };
    }
    record.has_withdrawn = true;
    WithdrawOutcome::Unlocked
}

/// Whether the "you may now withdraw" notice is due for `referrer_id`.
///
/// Evaluate immediately after an applied referral: it holds only when the
/// count is exactly the quota, so it fires on the referral that reaches the
/// quota and never again.
pub fn quota_reached_notification(doc: &UserDocument, referrer_id: UserId) -> bool {
    referral_count(doc, referrer_id) == REFERRAL_QUOTA
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc_with(ids: &[i64]) -> UserDocument {
        let mut doc = UserDocument::default();
        for &id in ids {
            register_user(&mut doc, UserId(id), None);
        }
        doc
    }

    #[test]
    fn test_register_user_is_idempotent() {
        let mut doc = UserDocument::default();
        assert!(register_user(&mut doc, UserId(1), Some("alice")));
        doc.users.get_mut(&UserId(1)).unwrap().referrals.push(UserId(2));

        assert!(!register_user(&mut doc, UserId(1), Some("renamed")));
        let record = doc.user(UserId(1)).unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(record.referrals, vec![UserId(2)]);
    }

    #[test]
    fn test_self_referral_rejected_without_mutation() {
        let mut doc = doc_with(&[1]);
        let before = doc.clone();
        assert_eq!(
            record_referral(&mut doc, UserId(1), UserId(1)),
            ReferralOutcome::SelfReferral
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn test_unknown_referrer_rejected() {
        let mut doc = doc_with(&[2]);
        let before = doc.clone();
        assert_eq!(
            record_referral(&mut doc, UserId(1), UserId(2)),
            ReferralOutcome::ReferrerUnknown
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn test_unknown_referee_rejected() {
        let mut doc = doc_with(&[1]);
        assert_eq!(
            record_referral(&mut doc, UserId(1), UserId(2)),
            ReferralOutcome::RefereeUnknown
        );
        assert!(doc.user(UserId(1)).unwrap().referrals.is_empty());
    }

    #[test]
    fn test_applied_sets_both_sides() {
        let mut doc = doc_with(&[1, 2]);
        assert_eq!(
            record_referral(&mut doc, UserId(1), UserId(2)),
            ReferralOutcome::Applied { referral_count: 1 }
        );
        assert_eq!(doc.user(UserId(1)).unwrap().referrals, vec![UserId(2)]);
        assert_eq!(doc.user(UserId(2)).unwrap().referred_by, Some(UserId(1)));
    }

    #[test]
    fn test_duplicate_referral_rejected() {
        let mut doc = doc_with(&[1, 2]);
        record_referral(&mut doc, UserId(1), UserId(2));
        assert_eq!(
            record_referral(&mut doc, UserId(1), UserId(2)),
            ReferralOutcome::AlreadyReferred
        );
        assert_eq!(referral_count(&doc, UserId(1)), 1);
    }

    #[test]
    fn test_referred_by_is_write_once() {
        let mut doc = doc_with(&[1, 2, 3]);
        record_referral(&mut doc, UserId(1), UserId(3));
        assert_eq!(
            record_referral(&mut doc, UserId(2), UserId(3)),
            ReferralOutcome::AlreadyReferred
        );
        assert_eq!(doc.user(UserId(3)).unwrap().referred_by, Some(UserId(1)));
        assert!(doc.user(UserId(2)).unwrap().referrals.is_empty());
    }

    #[test]
    fn test_cycle_rejected() {
        // 1 -> 2 -> 3, then 3 trying to recruit 1.
        let mut doc = doc_with(&[1, 2, 3]);
        record_referral(&mut doc, UserId(1), UserId(2));
        record_referral(&mut doc, UserId(2), UserId(3));
        assert_eq!(
            record_referral(&mut doc, UserId(3), UserId(1)),
            ReferralOutcome::WouldCycle
        );
        assert_eq!(doc.user(UserId(1)).unwrap().referred_by, None);
    }

    #[test]
    fn test_quota_notification_fires_only_at_exact_quota() {
        let mut doc = doc_with(&[1, 2, 3, 4, 5]);
        let mut fired = Vec::new();
        for referee in 2..=5 {
            let outcome = record_referral(&mut doc, UserId(1), UserId(referee));
            assert!(outcome.is_applied());
            fired.push(quota_reached_notification(&doc, UserId(1)));
        }
        assert_eq!(fired, vec![false, false, true, false]);
    }

    #[test]
    fn test_withdraw_not_eligible_with_two_referrals() {
        let mut doc = doc_with(&[1, 2, 3]);
        record_referral(&mut doc, UserId(1), UserId(2));
        record_referral(&mut doc, UserId(1), UserId(3));

        assert_eq!(
            mark_withdrawn(&mut doc, UserId(1)),
            WithdrawOutcome::NotEligible { remaining: 1 }
        );
        assert!(!doc.user(UserId(1)).unwrap().has_withdrawn);
    }

    #[test]
    fn test_withdraw_unlocks_once() {
        let mut doc = doc_with(&[1, 2, 3, 4]);
        for referee in 2..=4 {
            record_referral(&mut doc, UserId(1), UserId(referee));
        }
        assert!(is_eligible_to_withdraw(&doc, UserId(1)));
        assert_eq!(mark_withdrawn(&mut doc, UserId(1)), WithdrawOutcome::Unlocked);
        assert_eq!(
            mark_withdrawn(&mut doc, UserId(1)),
            WithdrawOutcome::AlreadyUnlocked
        );
        assert!(doc.user(UserId(1)).unwrap().has_withdrawn);
    }

    #[test]
    fn test_withdraw_unknown_user() {
        let mut doc = UserDocument::default();
        assert_eq!(
            mark_withdrawn(&mut doc, UserId(9)),
            WithdrawOutcome::UnknownUser
        );
        assert!(doc.users.is_empty());
    }

    #[test]
    fn test_counts_for_absent_user() {
        let doc = UserDocument::default();
        assert_eq!(referral_count(&doc, UserId(1)), 0);
        assert_eq!(remaining_referrals(&doc, UserId(1)), REFERRAL_QUOTA);
        assert!(!is_eligible_to_withdraw(&doc, UserId(1)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register(i64),
        Refer(i64, i64),
        Withdraw(i64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0i64..8).prop_map(Op::Register),
            ((0i64..8), (0i64..8)).prop_map(|(a, b)| Op::Refer(a, b)),
            (0i64..8).prop_map(Op::Withdraw),
        ]
    }

    proptest! {
        /// Property: over any operation sequence, referred_by is written at most
        /// once, referral lists never shrink or repeat, withdrawal is monotonic,
        /// and no user ends up in its own referral chain.
        #[test]
        fn referral_invariants_hold(ops in proptest::collection::vec(arb_op(), 0..80)) {
            let mut doc = UserDocument::default();

            for op in ops {
                let before = doc.clone();
                match op {
                    Op::Register(id) => {
                        register_user(&mut doc, UserId(id), None);
                    }
                    Op::Refer(referrer, referee) => {
                        let outcome = record_referral(&mut doc, UserId(referrer), UserId(referee));
                        if !outcome.is_applied() {
                            prop_assert_eq!(&doc, &before);
                        }
                        if referrer == referee {
                            prop_assert_eq!(outcome, ReferralOutcome::SelfReferral);
                        }
                    }
                    Op::Withdraw(id) => {
                        let outcome = mark_withdrawn(&mut doc, UserId(id));
                        if outcome == WithdrawOutcome::Unlocked {
                            prop_assert!(!before.user(UserId(id)).unwrap().has_withdrawn);
                        }
                    }
                }

                for (id, old) in &before.users {
                    let new = doc.user(*id).unwrap();
                    if old.referred_by.is_some() {
                        prop_assert_eq!(old.referred_by, new.referred_by);
                    }
                    prop_assert!(new.referrals.starts_with(&old.referrals));
                    if old.has_withdrawn {
                        prop_assert!(new.has_withdrawn);
                    }
                    if is_eligible_to_withdraw(&before, *id) {
                        prop_assert!(is_eligible_to_withdraw(&doc, *id));
                    }
                }

                for (id, record) in &doc.users {
                    prop_assert!(!record.referrals.contains(id));
                    let mut unique = record.referrals.clone();
                    unique.sort();
                    unique.dedup();
                    prop_assert_eq!(unique.len(), record.referrals.len());
                    prop_assert!(!is_ancestor(&doc, *id, *id));
                    if record.has_withdrawn {
                        prop_assert!(record.referrals.len() >= REFERRAL_QUOTA);
                    }
                }
            }
        }
    }
}
