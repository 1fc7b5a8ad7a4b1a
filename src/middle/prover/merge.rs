//! Merge points: labels, loops and function exits collect the types carried
//! by every edge leading to them and settle on one.

use super::{
    ASTContext, Result,
    error::{ProveErrorKind, fail},
};
use crate::{
    frontend::anchor::Anchor,
    middle::{
        ir::ValueId,
        qualifier::{IdSet, Ownership, Qualifiers, UniqueId},
        ty::{Type, TypeKind},
    },
    session::Session,
};

impl Session {
    /// The narrowest type both `a` and `b` fit into, if any. Distinct unique
    /// ids merge into an unknown one, views merge into the union of what
    /// they observe.
    pub(crate) fn unify(&mut self, a: &Type, b: &Type) -> Option<Type> {
        if a == b {
            return Some(a.clone());
        }
        if a.is_noreturn() {
            return Some(b.clone());
        }
        if b.is_noreturn() {
            return Some(a.clone());
        }

        match (&**a, &**b) {
            (TypeKind::Arguments(left), TypeKind::Arguments(right)) => {
                if left.len() != right.len() {
                    return None;
                }

                let (left, right) = (left.clone(), right.clone());
                let elements = left
                    .iter()
                    .zip(right.iter())
                    .map(|(l, r)| self.unify(l, r))
                    .collect::<Option<Vec<_>>>()?;
                return Some(self.types.intern(TypeKind::Arguments(elements.into())));
            }
            (TypeKind::Arguments(_), _) | (_, TypeKind::Arguments(_)) => return None,
            _ => {}
        }

        if a.base() != b.base() || a.refer() != b.refer() {
            return None;
        }

        let ownership = match (a.ownership(), b.ownership()) {
            (Some(Ownership::Unique(x)), Some(Ownership::Unique(y))) => {
                Ownership::Unique(if x == y { *x } else { UniqueId::UNKNOWN })
            }
            (Some(Ownership::View(x)), Some(Ownership::View(y))) => Ownership::View(x.union(y)),
            (Some(Ownership::View(ids)), None) | (None, Some(Ownership::View(ids))) => {
                Ownership::View(ids.clone())
            }
            _ => return None,
        };

        Some(self.types.qualify(
            a,
            Qualifiers {
                ownership: Some(ownership),
                refer: None,
            },
        ))
    }

    /// Folds the types carried by `edges` into one. Without edges the merge
    /// point is never reached.
    pub(crate) fn unify_edges(&mut self, edges: &[ValueId]) -> Result<Type> {
        let mut merged: Option<(Type, Anchor)> = None;

        for edge in edges {
            let Some(ty) = self.edge_types.get(edge).cloned() else {
                continue;
            };
            let at = self.values[*edge].anchor;

            merged = Some(match merged {
                None => (ty, at),
                Some((current, first_at)) => match self.unify(&current, &ty) {
                    Some(unified) => (unified, first_at),
                    None => {
                        return fail(
                            ProveErrorKind::MergeMismatch {
                                first: current,
                                second: ty,
                                other: first_at,
                            },
                            at,
                        );
                    }
                },
            });
        }

        Ok(match merged {
            Some((ty, _)) => ty,
            None => self.types.noreturn(),
        })
    }

    /// Completes a merge point once all of its edges are known. Outer ids
    /// which only some edges consumed are dropped on the others, and unique
    /// results get fresh ids in the enclosing block.
    pub(crate) fn finalize_merge(
        &mut self,
        ctx: &ASTContext,
        label: ValueId,
        edges: &[ValueId],
        entry: &IdSet,
        anchor: Anchor,
    ) -> Result<Type> {
        let ty = self.unify_edges(edges)?;

        let lost = self.lost_ids(edges, entry);
        self.drop_lost_ids(ctx, edges, &lost, anchor)?;
        self.blocks[ctx.block].valid = entry.difference(&lost);

        if edges.is_empty() {
            return Ok(ty);
        }

        let ty = self.qualify_result(ctx, label, &ty, |ids| ids.clone());

        let valid = &self.blocks[ctx.block].valid;
        for element in ty.argument_types() {
            if let Some(id) = element
                .view_ids()
                .and_then(|ids| ids.iter().find(|id| !valid.contains(*id)))
            {
                return fail(ProveErrorKind::NotAlive { id }, anchor);
            }
        }

        log::trace!("merge point {label} settled on {ty}");
        Ok(ty)
    }

    /// Replaces every unique id with the unknown one, so that two types
    /// compare equal when they only differ in which resource they own
    pub(crate) fn shape(&mut self, ty: &Type) -> Type {
        self.types.map_ownership(ty, |ownership| match ownership {
            Some(Ownership::Unique(id)) if *id != UniqueId::GLOBAL => {
                Some(Ownership::Unique(UniqueId::UNKNOWN))
            }
            other => other.cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_types_unify_to_themselves() {
        let mut session = Session::new();
        let i32 = session.types.int(32);

        assert_eq!(session.unify(&i32, &i32), Some(i32));
    }

    #[test]
    fn views_unify_to_their_union() {
        let mut session = Session::new();
        let i32 = session.types.int(32);
        let left = session.types.view_type(&i32, IdSet::single(UniqueId::new(1)));
        let right = session.types.view_type(&i32, IdSet::single(UniqueId::new(2)));
        let plain = i32.clone();

        let merged = session.unify(&left, &right).unwrap();
        let ids = merged.view_ids().unwrap();
        assert!(ids.contains(UniqueId::new(1)) && ids.contains(UniqueId::new(2)));

        // a plain value views nothing
        assert_eq!(session.unify(&left, &plain), Some(left));
    }

    #[test]
    fn distinct_uniques_unify_to_unknown() {
        let mut session = Session::new();
        let i32 = session.types.int(32);
        let left = session.types.unique_type(&i32, UniqueId::new(4));
        let right = session.types.unique_type(&i32, UniqueId::new(5));
        let view = session.types.view_type(&i32, IdSet::single(UniqueId::new(4)));

        let merged = session.unify(&left, &right).unwrap();
        assert_eq!(merged.unique_id(), Some(UniqueId::UNKNOWN));
        assert_eq!(session.unify(&left, &view), None);
    }

    #[test]
    fn multi_values_of_different_arity_do_not_unify() {
        let mut session = Session::new();
        let i32 = session.types.int(32);
        let pair = session.types.arguments(&[i32.clone(), i32.clone()]);
        let triple = session.types.arguments(&[i32.clone(), i32.clone(), i32.clone()]);
        let noreturn = session.types.noreturn();

        assert_eq!(session.unify(&pair, &triple), None);
        assert_eq!(session.unify(&pair, &i32), None);
        assert_eq!(session.unify(&noreturn, &pair), Some(pair));
    }
}
