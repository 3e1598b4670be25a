use super::*;
use crate::test_support::subject;

#[test]
fn effective_counts_add_deltas_to_authoritative_counts() {
    let s = subject(1, 10, 2);
    let mut overlay = VoteOverlayStore::new();
    assert_eq!(overlay.effective_counts(&s), (10, 2));

    overlay.apply(&s, VoteDirection::Like);
    assert_eq!(overlay.effective_counts(&s), (11, 2));
    overlay.settle(SubjectId(1));
    overlay.apply(&s, VoteDirection::Dislike);
    assert_eq!(overlay.effective_counts(&s), (11, 3));
    overlay.settle(SubjectId(1));
    assert_eq!(overlay.effective_counts(&s), (11, 3));
}

#[test]
fn rendering_twice_without_changes_is_stable() {
    let s = subject(1, 10, 2);
    let mut overlay = VoteOverlayStore::new();
    overlay.apply(&s, VoteDirection::Like);
    let first = overlay.effective_counts(&s);
    let second = overlay.effective_counts(&s);
    assert_eq!(first, second);
    assert_eq!(overlay.entry(SubjectId(1)).map(|e| e.total()), Some((1, 0)));
}

#[test]
fn revert_restores_pre_vote_counts_and_drops_empty_entry() {
    let s = subject(1, 10, 2);
    let mut overlay = VoteOverlayStore::new();
    overlay.apply(&s, VoteDirection::Like);
    overlay.revert(SubjectId(1), VoteDirection::Like);
    assert_eq!(overlay.effective_counts(&s), (10, 2));
    assert!(overlay.entry(SubjectId(1)).is_none());
}

#[test]
fn revert_only_removes_the_failed_vote() {
    let s = subject(1, 10, 2);
    let mut overlay = VoteOverlayStore::new();
    overlay.apply(&s, VoteDirection::Like);
    overlay.settle(SubjectId(1));
    overlay.apply(&s, VoteDirection::Like);
    overlay.revert(SubjectId(1), VoteDirection::Like);

    let entry = overlay.entry(SubjectId(1)).expect("confirmed vote remains");
    assert_eq!(entry.like_delta, 1);
    assert_eq!(entry.in_flight, None);
    assert_eq!(overlay.effective_counts(&s), (11, 2));
}

#[test]
fn reconcile_clears_once_indexer_includes_vote() {
    let mut overlay = VoteOverlayStore::new();
    overlay.apply(&subject(1, 10, 2), VoteDirection::Like);
    overlay.settle(SubjectId(1));

    // indexer still behind
    assert!(overlay.reconcile(&[subject(1, 10, 2)]).is_empty());
    assert_eq!(overlay.effective_counts(&subject(1, 10, 2)), (11, 2));

    let caught_up = subject(1, 11, 2);
    assert_eq!(overlay.reconcile(&[caught_up.clone()]), vec![SubjectId(1)]);
    assert_eq!(overlay.effective_counts(&caught_up), (11, 2));
    assert!(overlay.entry(SubjectId(1)).is_none());
}

#[test]
fn reconcile_never_drops_an_in_flight_vote() {
    let mut overlay = VoteOverlayStore::new();
    overlay.apply(&subject(1, 10, 2), VoteDirection::Like);

    // other users' likes land while ours is still in flight
    let busier = subject(1, 15, 2);
    assert!(overlay.reconcile(&[busier.clone()]).is_empty());
    let entry = overlay.entry(SubjectId(1)).expect("entry");
    assert_eq!(entry.in_flight, Some(VoteDirection::Like));
    assert_eq!(entry.baseline_likes, 15);
    assert_eq!(overlay.effective_counts(&busier), (16, 2));

    // once confirmed, those other likes do not count as ours
    overlay.settle(SubjectId(1));
    assert!(overlay.reconcile(&[busier.clone()]).is_empty());
    assert_eq!(overlay.effective_counts(&busier), (16, 2));
    assert_eq!(overlay.reconcile(&[subject(1, 16, 2)]), vec![SubjectId(1)]);
}

#[test]
fn reconcile_folds_confirmed_part_while_another_vote_is_in_flight() {
    let mut overlay = VoteOverlayStore::new();
    overlay.apply(&subject(1, 10, 2), VoteDirection::Like);
    overlay.settle(SubjectId(1));
    overlay.apply(&subject(1, 10, 2), VoteDirection::Like);

    let first_indexed = subject(1, 11, 2);
    assert!(overlay.reconcile(&[first_indexed.clone()]).is_empty());
    let entry = overlay.entry(SubjectId(1)).expect("second vote in flight");
    assert_eq!((entry.like_delta, entry.baseline_likes), (0, 11));
    assert_eq!(overlay.effective_counts(&first_indexed), (12, 2));

    overlay.revert(SubjectId(1), VoteDirection::Like);
    assert!(overlay.entry(SubjectId(1)).is_none());
    assert_eq!(overlay.effective_counts(&first_indexed), (11, 2));
}

#[test]
fn baseline_follows_catalog_until_a_vote_is_confirmed() {
    let mut overlay = VoteOverlayStore::new();
    overlay.apply(&subject(1, 10, 2), VoteDirection::Like);
    overlay.revert(SubjectId(1), VoteDirection::Like);

    overlay.apply(&subject(1, 11, 2), VoteDirection::Like);
    overlay.settle(SubjectId(1));
    let entry = overlay.entry(SubjectId(1)).expect("entry");
    assert_eq!((entry.baseline_likes, entry.like_delta), (11, 1));

    // someone else's like is not mistaken for ours
    assert!(overlay.reconcile(&[subject(1, 11, 2)]).is_empty());
}

#[test]
fn reconcile_keeps_the_part_not_yet_indexed() {
    let s = subject(1, 10, 2);
    let mut overlay = VoteOverlayStore::new();
    overlay.apply(&s, VoteDirection::Like);
    overlay.settle(SubjectId(1));
    overlay.apply(&s, VoteDirection::Dislike);
    overlay.settle(SubjectId(1));

    let partial = subject(1, 11, 2);
    assert!(overlay.reconcile(&[partial.clone()]).is_empty());
    let entry = overlay.entry(SubjectId(1)).expect("dislike still pending");
    assert_eq!((entry.like_delta, entry.dislike_delta), (0, 1));
    assert_eq!(overlay.effective_counts(&partial), (11, 3));

    assert_eq!(overlay.reconcile(&[subject(1, 11, 3)]), vec![SubjectId(1)]);
}

#[test]
fn reconcile_ignores_subjects_missing_from_snapshot() {
    let mut overlay = VoteOverlayStore::new();
    overlay.apply(&subject(1, 10, 2), VoteDirection::Like);
    overlay.settle(SubjectId(1));
    assert!(overlay.reconcile(&[subject(2, 0, 0)]).is_empty());
    assert_eq!(overlay.pending_subjects(), vec![SubjectId(1)]);
}

#[test]
fn marks_report_previous_value() {
    let mut overlay = VoteOverlayStore::new();
    assert_eq!(overlay.mark(SubjectId(1)), None);
    assert_eq!(
        overlay.set_mark(SubjectId(1), Some(VoteDirection::Like)),
        None
    );
    assert_eq!(
        overlay.set_mark(SubjectId(1), Some(VoteDirection::Dislike)),
        Some(VoteDirection::Like)
    );
    assert_eq!(
        overlay.set_mark(SubjectId(1), None),
        Some(VoteDirection::Dislike)
    );
    assert_eq!(overlay.mark(SubjectId(1)), None);
}
