// tests/divergence.rs

mod common;

use common::Fixture;
use git_lineage::divergence::{find_divergent_branches, Window};
use git_lineage::CommitRange;

#[test]
fn test_unmerged_feature_branch() {
    let fx = Fixture::new();
    let c1 = fx.commit(&[], "alice", 1_000, "init", &[("f.txt", Some("a\n"))]);
    let c2 = fx.commit(&[c1], "alice", 2_000, "second", &[("f.txt", Some("a\nb\n"))]);
    let s1 = fx.commit(&[c2], "bob", 2_500, "start feature", &[("g.txt", Some("g\n"))]);
    let s2 = fx.commit(&[s1], "bob", 2_600, "finish feature", &[("g.txt", Some("g\nh\n"))]);
    let c3 = fx.commit(&[c2], "carol", 3_000, "third", &[("f.txt", Some("a\nb\nc\n"))]);
    fx.branch("master", c3);
    fx.branch("feature", s2);

    let repo = fx.open();
    let range = CommitRange::resolve(&repo, "HEAD", "ROOT").unwrap();
    assert_eq!(range.replay_path, vec![c1, c2, c3]);

    let branches = find_divergent_branches(&repo, &range, Window::for_range(&range, 1)).unwrap();
    assert_eq!(branches.len(), 1);
    let branch = &branches[0];
    assert_eq!(branch.branch_point, c2);
    assert_eq!(branch.path, vec![s1, s2]);
    assert_eq!(branch.head(), Some(s2));
    assert_eq!(branch.label.as_deref(), Some("feature"));
    assert!(!branch.rejoined);
}

#[test]
fn test_merged_branch_is_not_divergent() {
    let fx = Fixture::new();
    let c1 = fx.commit(&[], "alice", 1_000, "init", &[("f.txt", Some("a\n"))]);
    let s1 = fx.commit(&[c1], "bob", 1_500, "side", &[("g.txt", Some("g\n"))]);
    let c2 = fx.commit(&[c1], "alice", 2_000, "main", &[("f.txt", Some("a\nb\n"))]);
    let merge = fx.commit(&[c2, s1], "alice", 3_000, "merge", &[("g.txt", Some("g\n"))]);
    fx.branch("master", merge);
    fx.branch("side", s1);

    let repo = fx.open();
    let range = CommitRange::resolve(&repo, "HEAD", "ROOT").unwrap();
    assert!(range.contains(&s1));

    let branches = find_divergent_branches(&repo, &range, Window::for_range(&range, 1)).unwrap();
    assert!(branches.is_empty());
}

#[test]
fn test_branch_outside_window() {
    let fx = Fixture::new();
    let c1 = fx.commit(&[], "alice", 100_000, "init", &[("f.txt", Some("a\n"))]);
    let c2 = fx.commit(&[c1], "alice", 200_000, "main", &[("f.txt", Some("a\nb\n"))]);
    let late = fx.commit(&[c2], "bob", 200_000 + 5 * 86_400, "late", &[("g.txt", Some("g\n"))]);
    fx.branch("master", c2);
    fx.branch("late", late);

    let repo = fx.open();
    let range = CommitRange::resolve(&repo, "HEAD", "ROOT").unwrap();

    let narrow = find_divergent_branches(&repo, &range, Window::for_range(&range, 1)).unwrap();
    assert!(narrow.is_empty());

    let wide = find_divergent_branches(&repo, &range, Window::for_range(&range, 7)).unwrap();
    assert_eq!(wide.len(), 1);
    assert_eq!(wide[0].path, vec![late]);
    assert_eq!(wide[0].label.as_deref(), Some("late"));
}
