//! Interned types. Every structural type is stored exactly once in the
//! session's [`TypeContext`], so two [`Type`] handles are equal exactly when
//! they describe the same type. Nominal types ([`TypeKind::Typename`]) are
//! identified by their [`TypenameId`] and carry mutable information (storage,
//! destructor) in a side table until they are finalized.

use std::rc::Rc;

use colored::Colorize;
use hashbrown::HashSet;
use itertools::Itertools;
use strum::Display;

use super::qualifier::{Ownership, Qualifiers};
use crate::{
    frontend::{intern::Symbol, node::NodeId},
    index::{IndexVec, simple_index},
};

#[doc(hidden)]
mod private {
    #[doc(hidden)]
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct PrivateZst;
}

/// Thin pointer to an interned type kind. Do not construct directly. Instead,
/// use [`TypeContext::intern`] or one of the typed constructors.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Type(Rc<TypeKind>, private::PrivateZst);

simple_index! {
    /// Identifies a nominal type in the session's typename table
    pub struct TypenameId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerFlags(u8);

impl PointerFlags {
    pub const NONE: Self = Self(0);
    pub const NON_WRITABLE: Self = Self(1 << 1);
    pub const NON_READABLE: Self = Self(1 << 2);

    pub fn readonly() -> Self {
        Self::NON_WRITABLE
    }

    pub fn is_readable(self) -> bool {
        self.0 & Self::NON_READABLE.0 == 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & Self::NON_WRITABLE.0 == 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl core::fmt::Display for PointerFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => write!(f, "rw"),
            (true, false) => write!(f, "r"),
            (false, true) => write!(f, "w"),
            (false, false) => write!(f, "-"),
        }
    }
}

/// Where the memory behind a pointer or reference lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StorageClass {
    Generic,
    Function,
    Private,
    Uniform,
    Workgroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// The type of type constants
    Type,
    /// i32, u8, bool (`u1`)
    Integer { width: u16, signed: bool },
    /// f32, f64
    Real { width: u16 },
    /// A pointer to `element` with read/write capabilities
    Pointer {
        element: Type,
        flags: PointerFlags,
        storage: StorageClass,
    },
    /// [T x N]
    Array { element: Type, count: u64 },
    /// <T x N>, only over scalar integers and reals
    Vector { element: Type, count: u64 },
    /// {A B C}
    Tuple { fields: Rc<[Type]>, packed: bool },
    /// Overlapping storage for all fields
    Union { fields: Rc<[Type]> },
    /// A nominal type. Its storage lives in the typename table.
    Typename { id: TypenameId, name: Symbol },
    /// Opaque: can only be called or pointed to
    Function {
        return_type: Type,
        params: Rc<[Type]>,
        variadic: bool,
        raises: Option<Type>,
    },
    /// The unboxed multi-value produced by anything which yields 0..N results
    Arguments(Rc<[Type]>),
    /// The type of an expression which never yields control back
    NoReturn,
    /// A template closed over a frame. Only exists at compile time.
    Closure,
    /// A builtin operator. Only exists at compile time.
    Builtin,
    /// A base type wrapped in one or more qualifiers
    Qualified { base: Type, qualifiers: Qualifiers },
}

#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    #[error("type {0} is opaque and cannot be stored by value")]
    OpaqueElement(Type),
    #[error("vector elements must be scalar integers or reals, found {0}")]
    InvalidVectorElement(Type),
    #[error("storage of typename {0} has already been finalized")]
    AlreadyFinalized(Type),
    #[error("typename {0} has no storage")]
    NoStorage(Type),
    #[error("{0} is not a typename")]
    NotATypename(Type),
}

/// How far a typename has been defined
#[derive(Debug, Clone)]
pub enum TypenameStorage {
    /// Still open for a storage type. Opaque while in this state.
    Unfinalized,
    /// Finalized without storage; may only be used behind a pointer
    Opaque,
    Plain(Type),
}

#[derive(Debug, Clone)]
pub struct TypenameInfo {
    pub name: Symbol,
    pub supertype: Option<Type>,
    pub storage: TypenameStorage,
    /// Callable node invoked with a unique value of this type when it is
    /// dropped
    pub destructor: Option<NodeId>,
}

/// Type interning table. Owned by the session; never shared between
/// compilations.
#[derive(Debug, Default)]
pub struct TypeContext {
    table: HashSet<Rc<TypeKind>>,
    typenames: IndexVec<TypenameId, TypenameInfo>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, kind: TypeKind) -> Type {
        let rc = self.table.get_or_insert(Rc::new(kind));
        Type(rc.clone(), private::PrivateZst)
    }

    pub fn type_type(&mut self) -> Type {
        self.intern(TypeKind::Type)
    }

    pub fn integer(&mut self, width: u16, signed: bool) -> Type {
        self.intern(TypeKind::Integer { width, signed })
    }

    pub fn int(&mut self, width: u16) -> Type {
        self.integer(width, true)
    }

    pub fn uint(&mut self, width: u16) -> Type {
        self.integer(width, false)
    }

    pub fn bool(&mut self) -> Type {
        self.integer(1, false)
    }

    pub fn real(&mut self, width: u16) -> Type {
        self.intern(TypeKind::Real { width })
    }

    pub fn noreturn(&mut self) -> Type {
        self.intern(TypeKind::NoReturn)
    }

    pub fn closure(&mut self) -> Type {
        self.intern(TypeKind::Closure)
    }

    pub fn builtin(&mut self) -> Type {
        self.intern(TypeKind::Builtin)
    }

    /// The empty multi-value, used for expressions which yield nothing
    pub fn empty_arguments(&mut self) -> Type {
        self.intern(TypeKind::Arguments(Rc::from([])))
    }

    pub fn pointer(&mut self, element: Type, flags: PointerFlags, storage: StorageClass) -> Type {
        self.intern(TypeKind::Pointer {
            element,
            flags,
            storage,
        })
    }

    pub fn array(&mut self, element: Type, count: u64) -> Result<Type, TypeError> {
        self.verify_storable(&element)?;
        Ok(self.intern(TypeKind::Array { element, count }))
    }

    pub fn vector(&mut self, element: Type, count: u64) -> Result<Type, TypeError> {
        if !matches!(
            &*element,
            TypeKind::Integer { .. } | TypeKind::Real { .. }
        ) {
            return Err(TypeError::InvalidVectorElement(element));
        }

        Ok(self.intern(TypeKind::Vector { element, count }))
    }

    pub fn tuple(&mut self, fields: &[Type], packed: bool) -> Result<Type, TypeError> {
        for field in fields {
            self.verify_storable(field)?;
        }

        Ok(self.intern(TypeKind::Tuple {
            fields: fields.into(),
            packed,
        }))
    }

    pub fn union(&mut self, fields: &[Type]) -> Result<Type, TypeError> {
        for field in fields {
            self.verify_storable(field)?;
        }

        Ok(self.intern(TypeKind::Union {
            fields: fields.into(),
        }))
    }

    pub fn function(
        &mut self,
        return_type: Type,
        params: &[Type],
        variadic: bool,
        raises: Option<Type>,
    ) -> Type {
        self.intern(TypeKind::Function {
            return_type,
            params: params.into(),
            variadic,
            raises,
        })
    }

    /// A single non-multi-value type stands for itself, so `arguments([T])`
    /// is `T`.
    pub fn arguments(&mut self, types: &[Type]) -> Type {
        if let [single] = types
            && !matches!(&**single, TypeKind::Arguments(_))
        {
            return single.clone();
        }

        self.intern(TypeKind::Arguments(types.into()))
    }

    /// Creates a new, unfinalized nominal type
    pub fn typename(&mut self, name: impl Into<Symbol>, supertype: Option<Type>) -> Type {
        let name = name.into();
        let id = self.typenames.push(TypenameInfo {
            name,
            supertype,
            storage: TypenameStorage::Unfinalized,
            destructor: None,
        });

        self.intern(TypeKind::Typename { id, name })
    }

    pub fn typename_info(&self, ty: &Type) -> Option<&TypenameInfo> {
        match &**ty.base() {
            TypeKind::Typename { id, .. } => Some(&self.typenames[*id]),
            _ => None,
        }
    }

    fn typename_info_mut(&mut self, ty: &Type) -> Result<&mut TypenameInfo, TypeError> {
        match &**ty.base() {
            TypeKind::Typename { id, .. } => Ok(&mut self.typenames[*id]),
            _ => Err(TypeError::NotATypename(ty.clone())),
        }
    }

    /// Finalizes a typename with the given storage type
    pub fn set_storage(&mut self, ty: &Type, storage: Type) -> Result<(), TypeError> {
        self.verify_storable(&storage)?;

        let info = self.typename_info_mut(ty)?;
        if !matches!(info.storage, TypenameStorage::Unfinalized) {
            return Err(TypeError::AlreadyFinalized(ty.clone()));
        }

        info.storage = TypenameStorage::Plain(storage);
        Ok(())
    }

    /// Finalizes a typename without storage
    pub fn set_opaque(&mut self, ty: &Type) -> Result<(), TypeError> {
        let info = self.typename_info_mut(ty)?;
        if !matches!(info.storage, TypenameStorage::Unfinalized) {
            return Err(TypeError::AlreadyFinalized(ty.clone()));
        }

        info.storage = TypenameStorage::Opaque;
        Ok(())
    }

    pub fn set_destructor(&mut self, ty: &Type, destructor: NodeId) -> Result<(), TypeError> {
        self.typename_info_mut(ty)?.destructor = Some(destructor);
        Ok(())
    }

    pub fn destructor(&self, ty: &Type) -> Option<NodeId> {
        self.typename_info(ty).and_then(|info| info.destructor)
    }

    /// Types which cannot be stored by value: unfinalized or opaque typenames,
    /// function types, multi-values and `noreturn`
    pub fn is_opaque(&self, ty: &Type) -> bool {
        match &**ty.base() {
            TypeKind::Typename { id, .. } => match &self.typenames[*id].storage {
                TypenameStorage::Plain(_) => false,
                TypenameStorage::Unfinalized | TypenameStorage::Opaque => true,
            },
            TypeKind::Function { .. }
            | TypeKind::Arguments(_)
            | TypeKind::NoReturn
            | TypeKind::Closure
            | TypeKind::Builtin => true,
            TypeKind::Type
            | TypeKind::Integer { .. }
            | TypeKind::Real { .. }
            | TypeKind::Pointer { .. }
            | TypeKind::Array { .. }
            | TypeKind::Vector { .. }
            | TypeKind::Tuple { .. }
            | TypeKind::Union { .. } => false,
            TypeKind::Qualified { .. } => unreachable!("base types are never qualified"),
        }
    }

    fn verify_storable(&self, ty: &Type) -> Result<(), TypeError> {
        if self.is_opaque(ty) {
            return Err(TypeError::OpaqueElement(ty.clone()));
        }

        Ok(())
    }

    /// Resolves nominal types down to the structural type they are stored as,
    /// dropping all qualifiers on the way
    pub fn storage_type(&self, ty: &Type) -> Result<Type, TypeError> {
        let base = ty.base();
        match &**base {
            TypeKind::Typename { id, .. } => match &self.typenames[*id].storage {
                TypenameStorage::Plain(storage) => self.storage_type(storage),
                TypenameStorage::Unfinalized | TypenameStorage::Opaque => {
                    Err(TypeError::NoStorage(base.clone()))
                }
            },
            _ => Ok(base.clone()),
        }
    }
}

impl core::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Type").field(&self.0).finish()
    }
}

impl core::ops::Deref for Type {
    type Target = TypeKind;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Type {
    /// The type with all qualifiers removed
    pub fn base(&self) -> &Type {
        match &**self {
            TypeKind::Qualified { base, .. } => base,
            _ => self,
        }
    }

    pub fn qualifiers(&self) -> Option<&Qualifiers> {
        match &**self {
            TypeKind::Qualified { qualifiers, .. } => Some(qualifiers),
            _ => None,
        }
    }

    pub fn ownership(&self) -> Option<&Ownership> {
        self.qualifiers().and_then(|q| q.ownership.as_ref())
    }

    pub fn is_noreturn(&self) -> bool {
        matches!(&**self, TypeKind::NoReturn)
    }

    pub fn is_bool(&self) -> bool {
        matches!(
            &**self.base(),
            TypeKind::Integer {
                width: 1,
                signed: false
            }
        )
    }

    /// The number of values carried by this type when used as a result
    pub fn arity(&self) -> usize {
        match &**self {
            TypeKind::Arguments(types) => types.len(),
            TypeKind::NoReturn => 0,
            _ => 1,
        }
    }

    /// The type of the value at `index` when this type is used as a result
    pub fn argument_at(&self, index: usize) -> Option<Type> {
        match &**self {
            TypeKind::Arguments(types) => types.get(index).cloned(),
            TypeKind::NoReturn => None,
            _ if index == 0 => Some(self.clone()),
            _ => None,
        }
    }

    /// The individual result types this type stands for
    pub fn argument_types(&self) -> Vec<Type> {
        match &**self {
            TypeKind::Arguments(types) => types.to_vec(),
            TypeKind::NoReturn => vec![],
            _ => vec![self.clone()],
        }
    }

    pub fn colored(&self) -> colored::ColoredString {
        self.clone().into()
    }
}

impl core::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Type => write!(f, "type"),
            Self::Integer {
                width: 1,
                signed: false,
            } => write!(f, "bool"),
            Self::Integer { width, signed } => {
                write!(f, "{}{width}", if *signed { "i" } else { "u" })
            }
            Self::Real { width } => write!(f, "f{width}"),
            Self::Pointer {
                element,
                flags,
                storage,
            } => {
                write!(f, "(@ {}", **element)?;
                if *flags != PointerFlags::NONE {
                    write!(f, " {flags}")?;
                }
                if *storage != StorageClass::Generic {
                    write!(f, " {storage}")?;
                }
                write!(f, ")")
            }
            Self::Array { element, count } => write!(f, "[{} x {count}]", **element),
            Self::Vector { element, count } => write!(f, "<{} x {count}>", **element),
            Self::Tuple { fields, packed } => {
                let fields = fields.iter().map(|t| (**t).to_string()).join(" ");
                if *packed {
                    write!(f, "<{{{fields}}}>")
                } else {
                    write!(f, "{{{fields}}}")
                }
            }
            Self::Union { fields } => {
                write!(
                    f,
                    "(union {})",
                    fields.iter().map(|t| (**t).to_string()).join(" ")
                )
            }
            Self::Typename { name, .. } => write!(f, "{name}"),
            Self::Function {
                return_type,
                params,
                variadic,
                raises,
            } => {
                write!(
                    f,
                    "(fn ({}{}) -> {}",
                    params.iter().map(|t| (**t).to_string()).join(" "),
                    if *variadic { " ..." } else { "" },
                    **return_type
                )?;
                if let Some(raises) = raises {
                    write!(f, " raises {}", **raises)?;
                }
                write!(f, ")")
            }
            Self::Arguments(types) => {
                write!(
                    f,
                    "λ({})",
                    types.iter().map(|t| (**t).to_string()).join(" ")
                )
            }
            Self::NoReturn => write!(f, "noreturn"),
            Self::Closure => write!(f, "closure"),
            Self::Builtin => write!(f, "builtin"),
            Self::Qualified { base, qualifiers } => write!(f, "{qualifiers}{}", **base),
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.colored().yellow())
    }
}

impl From<Type> for colored::ColoredString {
    fn from(s: Type) -> Self {
        (*s).to_string().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_types_are_interned() {
        let mut types = TypeContext::new();

        let a = types.int(32);
        let b = types.int(32);
        let c = types.uint(32);

        assert_eq!(a, b);
        assert!(Rc::ptr_eq(&a.0, &b.0));
        assert_ne!(a, c);

        let t1 = types.tuple(&[a.clone(), c.clone()], false).unwrap();
        let t2 = types.tuple(&[b, c], false).unwrap();
        assert_eq!(t1, t2);
    }

    #[test]
    fn typenames_are_nominal() {
        let mut types = TypeContext::new();

        let a = types.typename("Handle", None);
        let b = types.typename("Handle", None);

        assert_ne!(a, b);
        assert!(a.to_string().contains("Handle"));
    }

    #[test]
    fn opaque_types_cannot_be_stored_by_value() {
        let mut types = TypeContext::new();

        let handle = types.typename("Handle", None);
        let i32 = types.int(32);

        assert!(matches!(
            types.array(handle.clone(), 4),
            Err(TypeError::OpaqueElement(_))
        ));

        // Pointers to opaque types are fine
        let ptr = types.pointer(handle.clone(), PointerFlags::NONE, StorageClass::Generic);
        assert!(types.array(ptr, 4).is_ok());

        types.set_storage(&handle, i32.clone()).unwrap();
        assert!(types.array(handle.clone(), 4).is_ok());
        assert_eq!(types.storage_type(&handle).unwrap(), i32);

        assert!(matches!(
            types.set_storage(&handle, i32),
            Err(TypeError::AlreadyFinalized(_))
        ));
    }

    #[test]
    fn function_types_are_opaque() {
        let mut types = TypeContext::new();

        let i32 = types.int(32);
        let f = types.function(i32.clone(), &[i32], false, None);

        assert!(types.is_opaque(&f));
        assert!(types.tuple(&[f], false).is_err());
    }

    #[test]
    fn vectors_require_scalar_elements() {
        let mut types = TypeContext::new();

        let f32 = types.real(32);
        let v = types.vector(f32.clone(), 4).unwrap();

        assert!(matches!(
            types.vector(v, 2),
            Err(TypeError::InvalidVectorElement(_))
        ));
    }

    #[test]
    fn single_arguments_collapse() {
        let mut types = TypeContext::new();

        let i32 = types.int(32);
        let f32 = types.real(32);

        assert_eq!(types.arguments(&[i32.clone()]), i32);

        let pair = types.arguments(&[i32.clone(), f32.clone()]);
        assert_eq!(pair.arity(), 2);
        assert_eq!(pair.argument_at(1), Some(f32));
        assert_eq!(types.empty_arguments().arity(), 0);
    }
}
