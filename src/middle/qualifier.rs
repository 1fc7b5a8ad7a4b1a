//! Ownership and reference qualifiers attached to types.
//!
//! A value of a `unique` type owns the resource identified by its
//! [`UniqueId`]. A value of a `view` type borrows one or more such resources
//! and is only usable while all of them are alive. A `refer` qualifier turns a
//! value into a reference to memory in some storage class.

use std::{collections::BTreeSet, rc::Rc};

use colored::Colorize;
use itertools::Itertools;

use super::ty::{PointerFlags, StorageClass, Type, TypeContext, TypeKind};

/// Identifies one owned resource within a function. Ids `1..=N` belong to
/// the function's `N` parameters; the rest are handed out as values are
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UniqueId(i32);

impl UniqueId {
    /// Owned by no function; never dropped
    pub const GLOBAL: Self = Self(-1);
    /// Placeholder produced by merging distinct unique ids
    pub const UNKNOWN: Self = Self(-2);

    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    pub const fn for_parameter(index: usize) -> Self {
        Self(index as i32 + 1)
    }

    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// `GLOBAL` and `UNKNOWN` never appear in validity sets
    pub const fn is_reserved(self) -> bool {
        self.0 < 0
    }

    /// If this id belongs to a parameter, the index of that parameter
    pub fn parameter_index(self, param_count: usize) -> Option<usize> {
        (self.0 >= 1 && (self.0 as usize) <= param_count).then(|| self.0 as usize - 1)
    }
}

impl core::fmt::Display for UniqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::GLOBAL => write!(f, "global"),
            Self::UNKNOWN => write!(f, "?"),
            Self(id) => write!(f, "{id}"),
        }
    }
}

/// Persistent ordered set of unique ids. Clones share storage until one of
/// them is modified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IdSet(Rc<BTreeSet<UniqueId>>);

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(id: UniqueId) -> Self {
        Self(Rc::new(BTreeSet::from([id])))
    }

    pub fn contains(&self, id: UniqueId) -> bool {
        self.0.contains(&id)
    }

    pub fn insert(&mut self, id: UniqueId) -> bool {
        if self.contains(id) {
            return false;
        }

        Rc::make_mut(&mut self.0).insert(id)
    }

    pub fn remove(&mut self, id: UniqueId) -> bool {
        if !self.contains(id) {
            return false;
        }

        Rc::make_mut(&mut self.0).remove(&id)
    }

    pub fn union(&self, other: &IdSet) -> IdSet {
        if other.0.is_subset(&self.0) {
            return self.clone();
        }

        Self(Rc::new(self.0.union(&other.0).copied().collect()))
    }

    pub fn difference(&self, other: &IdSet) -> IdSet {
        Self(Rc::new(self.0.difference(&other.0).copied().collect()))
    }

    pub fn is_subset(&self, other: &IdSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = UniqueId> + '_ {
        self.0.iter().copied()
    }

    /// Ids are handed out in increasing order, so this visits the most
    /// recently created resources first
    pub fn newest_first(&self) -> impl Iterator<Item = UniqueId> + '_ {
        self.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<UniqueId> for IdSet {
    fn from_iter<T: IntoIterator<Item = UniqueId>>(iter: T) -> Self {
        Self(Rc::new(iter.into_iter().collect()))
    }
}

impl core::fmt::Display for IdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.iter().join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ownership {
    Unique(UniqueId),
    View(IdSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Refer {
    pub flags: PointerFlags,
    pub storage: StorageClass,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Qualifiers {
    pub ownership: Option<Ownership>,
    pub refer: Option<Refer>,
}

impl Qualifiers {
    pub fn is_empty(&self) -> bool {
        self.ownership.is_none() && self.refer.is_none()
    }
}

impl core::fmt::Display for Qualifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ownership {
            Some(Ownership::Unique(id)) => write!(f, "%{id}:")?,
            Some(Ownership::View(ids)) => write!(f, "view{ids}:")?,
            None => {}
        }

        if let Some(refer) = &self.refer {
            write!(f, "&")?;
            if refer.flags != PointerFlags::NONE {
                write!(f, "({})", refer.flags)?;
            }
            if refer.storage != StorageClass::Generic {
                write!(f, "[{}]", refer.storage)?;
            }
        }

        Ok(())
    }
}

impl TypeContext {
    /// Applies `qualifiers` on top of whatever `ty` already carries. Present
    /// qualifiers replace existing ones of the same kind.
    pub fn qualify(&mut self, ty: &Type, qualifiers: Qualifiers) -> Type {
        let mut merged = ty.qualifiers().cloned().unwrap_or_default();
        if qualifiers.ownership.is_some() {
            merged.ownership = qualifiers.ownership;
        }
        if qualifiers.refer.is_some() {
            merged.refer = qualifiers.refer;
        }

        self.with_qualifiers(ty.base().clone(), merged)
    }

    fn with_qualifiers(&mut self, base: Type, qualifiers: Qualifiers) -> Type {
        if qualifiers.is_empty() {
            return base;
        }

        self.intern(TypeKind::Qualified { base, qualifiers })
    }

    pub fn unique_type(&mut self, ty: &Type, id: UniqueId) -> Type {
        self.qualify(
            ty,
            Qualifiers {
                ownership: Some(Ownership::Unique(id)),
                refer: None,
            },
        )
    }

    /// A view of no resources is a plain value
    pub fn view_type(&mut self, ty: &Type, ids: IdSet) -> Type {
        if ids.is_empty() {
            return self.strip_ownership(ty);
        }

        self.qualify(
            ty,
            Qualifiers {
                ownership: Some(Ownership::View(ids)),
                refer: None,
            },
        )
    }

    pub fn refer_type(&mut self, ty: &Type, flags: PointerFlags, storage: StorageClass) -> Type {
        self.qualify(
            ty,
            Qualifiers {
                ownership: None,
                refer: Some(Refer { flags, storage }),
            },
        )
    }

    pub fn strip_ownership(&mut self, ty: &Type) -> Type {
        match ty.qualifiers() {
            Some(q) if q.ownership.is_some() => {
                let qualifiers = Qualifiers {
                    ownership: None,
                    refer: q.refer,
                };
                self.with_qualifiers(ty.base().clone(), qualifiers)
            }
            _ => ty.clone(),
        }
    }

    pub fn strip_refer(&mut self, ty: &Type) -> Type {
        match ty.qualifiers() {
            Some(q) if q.refer.is_some() => {
                let qualifiers = Qualifiers {
                    ownership: q.ownership.clone(),
                    refer: None,
                };
                self.with_qualifiers(ty.base().clone(), qualifiers)
            }
            _ => ty.clone(),
        }
    }

    /// Rewrites the ownership of every element of a (possibly multi-value)
    /// type through `f`
    pub fn map_ownership(
        &mut self,
        ty: &Type,
        mut f: impl FnMut(Option<&Ownership>) -> Option<Ownership>,
    ) -> Type {
        match &**ty {
            TypeKind::Arguments(types) => {
                let types = types.clone();
                let mapped = types
                    .iter()
                    .map(|t| self.map_single_ownership(t, &mut f))
                    .collect::<Vec<_>>();
                self.intern(TypeKind::Arguments(mapped.into()))
            }
            _ => self.map_single_ownership(ty, &mut f),
        }
    }

    fn map_single_ownership(
        &mut self,
        ty: &Type,
        f: &mut impl FnMut(Option<&Ownership>) -> Option<Ownership>,
    ) -> Type {
        let ownership = f(ty.ownership());
        let refer = ty.qualifiers().and_then(|q| q.refer);
        let ownership = match ownership {
            Some(Ownership::View(ids)) if ids.is_empty() => None,
            other => other,
        };

        self.with_qualifiers(ty.base().clone(), Qualifiers { ownership, refer })
    }
}

impl Type {
    pub fn unique_id(&self) -> Option<UniqueId> {
        match self.ownership() {
            Some(Ownership::Unique(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn view_ids(&self) -> Option<&IdSet> {
        match self.ownership() {
            Some(Ownership::View(ids)) => Some(ids),
            _ => None,
        }
    }

    pub fn refer(&self) -> Option<&Refer> {
        self.qualifiers().and_then(|q| q.refer.as_ref())
    }
}

impl core::fmt::Display for Ownership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ownership::Unique(id) => write!(f, "{}", format!("unique {id}").magenta()),
            Ownership::View(ids) => write!(f, "{}", format!("view {ids}").magenta()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_sets_copy_on_write() {
        let mut a = IdSet::single(UniqueId::new(3));
        let b = a.clone();

        a.insert(UniqueId::new(5));

        assert!(a.contains(UniqueId::new(5)));
        assert!(!b.contains(UniqueId::new(5)));
        assert_eq!(
            a.newest_first().collect::<Vec<_>>(),
            vec![UniqueId::new(5), UniqueId::new(3)]
        );
    }

    #[test]
    fn unique_and_view_are_exclusive() {
        let mut types = TypeContext::new();
        let i32 = types.int(32);

        let unique = types.unique_type(&i32, UniqueId::new(4));
        assert_eq!(unique.unique_id(), Some(UniqueId::new(4)));

        let view = types.view_type(&unique, IdSet::single(UniqueId::new(4)));
        assert_eq!(view.unique_id(), None);
        assert_eq!(view.view_ids(), Some(&IdSet::single(UniqueId::new(4))));
        assert_eq!(view.base(), &i32);
    }

    #[test]
    fn empty_view_is_plain() {
        let mut types = TypeContext::new();
        let i32 = types.int(32);

        let unique = types.unique_type(&i32, UniqueId::new(1));
        assert_eq!(types.view_type(&unique, IdSet::new()), i32);
        assert_eq!(types.strip_ownership(&unique), i32);
    }

    #[test]
    fn refer_survives_ownership_changes() {
        let mut types = TypeContext::new();
        let i32 = types.int(32);

        let reference = types.refer_type(&i32, PointerFlags::readonly(), StorageClass::Function);
        let owned = types.unique_type(&reference, UniqueId::new(2));
        let plain = types.strip_ownership(&owned);

        assert_eq!(plain, reference);
        assert_eq!(types.strip_refer(&plain), i32);
    }

    #[test]
    fn parameter_ids_start_at_one() {
        assert_eq!(UniqueId::for_parameter(0), UniqueId::new(1));
        assert_eq!(UniqueId::new(2).parameter_index(2), Some(1));
        assert_eq!(UniqueId::new(3).parameter_index(2), None);
        assert!(UniqueId::GLOBAL.is_reserved());
    }
}
