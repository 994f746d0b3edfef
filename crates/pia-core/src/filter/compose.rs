//! Conjunction of preset constraints with caller filters

use super::ast::Expr;
use std::sync::Arc;

/// Merge a caller filter with a tool preset.
///
/// The preset is the left operand of the new `and` root. Neither input is
/// copied or modified; the result shares both subtrees.
pub fn compose(user: Option<Arc<Expr>>, preset: Option<Arc<Expr>>) -> Option<Arc<Expr>> {
    match (preset, user) {
        (None, None) => None,
        (Some(tree), None) | (None, Some(tree)) => Some(tree),
        (Some(preset), Some(user)) => Some(Arc::new(Expr::and(preset, user))),
    }
}

/// Fold several presets left to right, all ahead of the caller filter
pub fn compose_all<I>(user: Option<Arc<Expr>>, presets: I) -> Option<Arc<Expr>>
where
    I: IntoIterator<Item = Arc<Expr>>,
{
    let merged = presets
        .into_iter()
        .fold(None, |acc, preset| compose(Some(preset), acc));
    compose(user, merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{parse, BinaryOp};

    fn tree(text: &str) -> Arc<Expr> {
        parse(text).unwrap().unwrap()
    }

    #[test]
    fn test_both_absent() {
        assert!(compose(None, None).is_none());
    }

    #[test]
    fn test_identity_keeps_same_arc() {
        let preset = tree("SourceDocumentDataSource eq 'GAO'");
        let out = compose(None, Some(preset.clone())).unwrap();
        assert!(Arc::ptr_eq(&out, &preset));

        let user = tree("RecStatus eq 'Open'");
        let out = compose(Some(user.clone()), None).unwrap();
        assert!(Arc::ptr_eq(&out, &user));
    }

    #[test]
    fn test_preset_is_left_operand() {
        let preset = tree("SourceDocumentDataSource eq 'GAO'");
        let user = tree("a eq 1 or b eq 2");
        let out = compose(Some(user.clone()), Some(preset.clone())).unwrap();

        match out.as_ref() {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                assert!(Arc::ptr_eq(left, &preset));
                assert!(Arc::ptr_eq(right, &user));
            }
            other => panic!("expected and root, got {other:?}"),
        }
        assert_eq!(
            out.to_string(),
            "SourceDocumentDataSource eq 'GAO' and (a eq 1 or b eq 2)"
        );
    }

    #[test]
    fn test_preset_not_mutated_across_requests() {
        let preset = tree("SourceDocumentDataSource eq 'CRS'");
        let before = preset.to_string();
        for text in ["a eq 1", "b eq 2 or c eq 3", "not d eq 4"] {
            let _ = compose(Some(tree(text)), Some(preset.clone()));
        }
        assert_eq!(preset.to_string(), before);
    }

    #[test]
    fn test_compose_all_orders_presets_first() {
        let out = compose_all(
            Some(tree("c eq 3")),
            vec![tree("a eq 1"), tree("b eq 2")],
        )
        .unwrap();
        assert_eq!(out.to_string(), "a eq 1 and b eq 2 and c eq 3");
    }

    #[test]
    fn test_compose_all_without_presets() {
        let user = tree("x eq 'y'");
        let out = compose_all(Some(user.clone()), Vec::new()).unwrap();
        assert!(Arc::ptr_eq(&out, &user));
    }
}
