use std::collections::HashSet;

use mediavec_core::distance::{cosine_distance, dot_product};
use mediavec_core::{DistanceMetric, Expression, FlatIndex, IndexEntry, Mtime, SearchResult};
use proptest::prelude::*;

/// Boolean tree used as a reference for RPN evaluation.
#[derive(Debug, Clone)]
enum Tree {
    Tag(String),
    Not(Box<Tree>),
    And(Box<Tree>, Box<Tree>),
    Or(Box<Tree>, Box<Tree>),
}

impl Tree {
    fn eval(&self, tags: &HashSet<String>) -> bool {
        match self {
            Tree::Tag(t) => tags.contains(t),
            Tree::Not(a) => !a.eval(tags),
            Tree::And(a, b) => a.eval(tags) && b.eval(tags),
            Tree::Or(a, b) => a.eval(tags) || b.eval(tags),
        }
    }

    fn to_rpn(&self, out: &mut Vec<String>) {
        match self {
            Tree::Tag(t) => out.push(t.clone()),
            Tree::Not(a) => {
                a.to_rpn(out);
                out.push("NOT".into());
            }
            Tree::And(a, b) => {
                a.to_rpn(out);
                b.to_rpn(out);
                out.push("AND".into());
            }
            Tree::Or(a, b) => {
                a.to_rpn(out);
                b.to_rpn(out);
                out.push("OR".into());
            }
        }
    }
}

fn tag_name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["beach", "cat", "dog", "family", "and", "Or"]).prop_map(String::from)
}

fn tree() -> impl Strategy<Value = Tree> {
    tag_name().prop_map(Tree::Tag).prop_recursive(5, 32, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|a| Tree::Not(Box::new(a))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Tree::And(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Tree::Or(Box::new(a), Box::new(b))),
        ]
    })
}

fn tag_set() -> impl Strategy<Value = HashSet<String>> {
    prop::collection::hash_set(tag_name(), 0..6)
}

proptest! {
    #[test]
    fn test_rpn_matches_tree_evaluation(tree in tree(), tags in tag_set()) {
        let mut tokens = Vec::new();
        tree.to_rpn(&mut tokens);

        let expr = Expression::parse(&tokens).unwrap();
        prop_assert_eq!(expr.evaluate(&tags), tree.eval(&tags));

        // Display is the whitespace-joined token list and parses back.
        let reparsed: Expression = expr.to_string().parse().unwrap();
        prop_assert_eq!(reparsed, expr);
    }

    #[test]
    fn test_truncated_rpn_is_rejected(tree in tree()) {
        let mut tokens = Vec::new();
        tree.to_rpn(&mut tokens);
        prop_assume!(matches!(tokens.last().map(String::as_str), Some("AND") | Some("OR")));

        // Dropping a final binary operator leaves two values on the stack.
        tokens.pop();
        prop_assert!(Expression::parse(&tokens).is_err());
    }

    #[test]
    fn test_exact_search_is_sorted_and_complete(
        vectors in prop::collection::vec(prop::collection::vec(-1.0f32..1.0f32, 4), 1..40),
        query in prop::collection::vec(-1.0f32..1.0f32, 4),
        k in 1usize..50
    ) {
        prop_assume!(dot_product(&query, &query) > 1e-6);
        prop_assume!(vectors.iter().all(|v| dot_product(v, v) > 1e-6));

        let mut index = FlatIndex::new(DistanceMetric::Cosine, Some(4));
        for (i, v) in vectors.iter().enumerate() {
            index
                .upsert(IndexEntry::new(format!("/p/{:03}.jpg", i), v.clone(), Mtime::new(0, 0)))
                .unwrap();
        }

        let results = index.search(&query, k).unwrap();
        prop_assert_eq!(results.len(), k.min(vectors.len()));

        for pair in results.windows(2) {
            prop_assert!(pair[0] <= pair[1], "out of order: {:?}", pair);
            prop_assert!(pair[0].score >= pair[1].score);
        }

        // Nothing left out scores better than the last returned hit.
        let returned: HashSet<_> = results.iter().map(|r| r.path.clone()).collect();
        let worst = results.last().unwrap().score;
        for (i, v) in vectors.iter().enumerate() {
            let path = std::path::PathBuf::from(format!("/p/{:03}.jpg", i));
            if !returned.contains(&path) {
                prop_assert!(1.0 - cosine_distance(&query, v) <= worst + 1e-5);
            }
        }
    }

    #[test]
    fn test_equal_scores_break_ties_by_path(
        names in prop::collection::hash_set("[a-c/-]{1,8}", 1..20)
    ) {
        let mut results: Vec<SearchResult> = names
            .iter()
            .map(|n| SearchResult::new(format!("/p/{}.jpg", n).into(), 0.5))
            .collect();
        results.sort();

        let paths: Vec<String> = results
            .iter()
            .map(|r| r.path.to_string_lossy().into_owned())
            .collect();
        let mut expected = paths.clone();
        expected.sort();
        prop_assert_eq!(paths, expected);
    }
}
