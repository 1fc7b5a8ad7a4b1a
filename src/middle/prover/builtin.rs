//! The builtin operator table. Each entry gives the argument count and
//! argument kinds an operator accepts, how its operands are passed, and
//! what ownership its result carries. Result types are computed in
//! [`Session::prove_builtin`]; the control transfer builtins are routed into
//! the merge machinery instead of producing an instruction.

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use super::{
    ASTContext, Result,
    error::{ProveErrorKind, WithAnchor, fail},
    ownership::{ArgMode, Operand},
};
use crate::{
    frontend::anchor::Anchor,
    middle::{
        ir::{InstructionKind, TypedValue, ValueId, ValueKind},
        qualifier::{IdSet, Ownership},
        ty::{PointerFlags, StorageClass, Type, TypeKind},
    },
    session::Session,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum Builtin {
    // integer arithmetic
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "sdiv")]
    SDiv,
    #[strum(serialize = "udiv")]
    UDiv,
    #[strum(serialize = "srem")]
    SRem,
    #[strum(serialize = "urem")]
    URem,
    #[strum(serialize = "shl")]
    Shl,
    #[strum(serialize = "lshr")]
    LShr,
    #[strum(serialize = "ashr")]
    AShr,
    #[strum(serialize = "band")]
    BAnd,
    #[strum(serialize = "bor")]
    BOr,
    #[strum(serialize = "bxor")]
    BXor,

    // real arithmetic
    #[strum(serialize = "fadd")]
    FAdd,
    #[strum(serialize = "fsub")]
    FSub,
    #[strum(serialize = "fmul")]
    FMul,
    #[strum(serialize = "fdiv")]
    FDiv,
    #[strum(serialize = "frem")]
    FRem,
    #[strum(serialize = "fma")]
    Fma,
    #[strum(serialize = "sqrt")]
    Sqrt,
    #[strum(serialize = "sin")]
    Sin,
    #[strum(serialize = "cos")]
    Cos,
    #[strum(serialize = "exp")]
    Exp,
    #[strum(serialize = "log")]
    Log,
    #[strum(serialize = "floor")]
    Floor,
    #[strum(serialize = "fabs")]
    FAbs,

    // comparisons
    #[strum(serialize = "icmp==")]
    ICmpEq,
    #[strum(serialize = "icmp!=")]
    ICmpNe,
    #[strum(serialize = "icmp<s")]
    ICmpSLt,
    #[strum(serialize = "icmp<=s")]
    ICmpSLe,
    #[strum(serialize = "icmp>s")]
    ICmpSGt,
    #[strum(serialize = "icmp>=s")]
    ICmpSGe,
    #[strum(serialize = "icmp<u")]
    ICmpULt,
    #[strum(serialize = "icmp>u")]
    ICmpUGt,
    #[strum(serialize = "fcmp==o")]
    FCmpOEq,
    #[strum(serialize = "fcmp!=o")]
    FCmpONe,
    #[strum(serialize = "fcmp<o")]
    FCmpOLt,
    #[strum(serialize = "fcmp<=o")]
    FCmpOLe,
    #[strum(serialize = "fcmp>o")]
    FCmpOGt,
    #[strum(serialize = "fcmp>=o")]
    FCmpOGe,

    // conversions
    #[strum(serialize = "bitcast")]
    Bitcast,
    #[strum(serialize = "inttoptr")]
    IntToPtr,
    #[strum(serialize = "ptrtoint")]
    PtrToInt,
    #[strum(serialize = "itrunc")]
    ITrunc,
    #[strum(serialize = "zext")]
    ZExt,
    #[strum(serialize = "sext")]
    SExt,
    #[strum(serialize = "fptosi")]
    FPToSI,
    #[strum(serialize = "sitofp")]
    SIToFP,

    // aggregates
    #[strum(serialize = "extractvalue")]
    ExtractValue,
    #[strum(serialize = "insertvalue")]
    InsertValue,
    #[strum(serialize = "undef")]
    Undef,
    #[strum(serialize = "typeof")]
    TypeOf,

    // memory
    #[strum(serialize = "malloc")]
    Malloc,
    #[strum(serialize = "free")]
    Free,
    #[strum(serialize = "load")]
    Load,
    #[strum(serialize = "store")]
    Store,
    #[strum(serialize = "ref->ptr")]
    RefToPtr,
    #[strum(serialize = "ptr->ref")]
    PtrToRef,

    // ownership
    #[strum(serialize = "move")]
    Move,
    #[strum(serialize = "view")]
    View,
    #[strum(serialize = "drop")]
    Drop,
    #[strum(serialize = "lose")]
    Lose,

    // control transfer
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "raise")]
    Raise,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "repeat")]
    Repeat,
}

/// What an argument's storage type has to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ArgKind {
    #[strum(serialize = "any value")]
    Any,
    #[strum(serialize = "an integer or integer vector")]
    Integer,
    #[strum(serialize = "a real or real vector")]
    Real,
    #[strum(serialize = "a pointer")]
    Pointer,
    #[strum(serialize = "a reference")]
    Reference,
    #[strum(serialize = "an aggregate")]
    Aggregate,
    #[strum(serialize = "a type constant")]
    TypeConstant,
    #[strum(serialize = "an integer constant")]
    IntegerConstant,
}

/// Ownership carried by a builtin's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultQualifier {
    Plain,
    /// A new resource owned by the caller
    Unique,
    /// Borrows every resource its operands own or view
    ViewOfOperands,
}

#[derive(Debug, Clone, Copy)]
pub struct BuiltinSignature {
    pub min: usize,
    pub max: Option<usize>,
    /// Kind of each argument; the last entry applies to any further ones
    pub kinds: &'static [ArgKind],
    pub mode: ArgMode,
    pub result: ResultQualifier,
}

impl BuiltinSignature {
    const fn new(
        count: usize,
        kinds: &'static [ArgKind],
        mode: ArgMode,
        result: ResultQualifier,
    ) -> Self {
        Self {
            min: count,
            max: Some(count),
            kinds,
            mode,
            result,
        }
    }

    const fn variadic(min: usize, kinds: &'static [ArgKind], mode: ArgMode) -> Self {
        Self {
            min,
            max: None,
            kinds,
            mode,
            result: ResultQualifier::Plain,
        }
    }

    pub fn kind_at(&self, index: usize) -> ArgKind {
        self.kinds
            .get(index)
            .or(self.kinds.last())
            .copied()
            .unwrap_or(ArgKind::Any)
    }
}

use ArgKind::*;
use ResultQualifier::{Plain, Unique, ViewOfOperands};

pub static BUILTIN_TABLE: Lazy<HashMap<Builtin, BuiltinSignature>> = Lazy::new(|| {
    let mut table = HashMap::new();

    let integer2 = BuiltinSignature::new(2, &[Integer, Integer], ArgMode::Auto, Plain);
    for op in [
        Builtin::Add,
        Builtin::Sub,
        Builtin::Mul,
        Builtin::SDiv,
        Builtin::UDiv,
        Builtin::SRem,
        Builtin::URem,
        Builtin::Shl,
        Builtin::LShr,
        Builtin::AShr,
        Builtin::BAnd,
        Builtin::BOr,
        Builtin::BXor,
        Builtin::ICmpEq,
        Builtin::ICmpNe,
        Builtin::ICmpSLt,
        Builtin::ICmpSLe,
        Builtin::ICmpSGt,
        Builtin::ICmpSGe,
        Builtin::ICmpULt,
        Builtin::ICmpUGt,
    ] {
        table.insert(op, integer2);
    }

    let real2 = BuiltinSignature::new(2, &[Real, Real], ArgMode::Auto, Plain);
    for op in [
        Builtin::FAdd,
        Builtin::FSub,
        Builtin::FMul,
        Builtin::FDiv,
        Builtin::FRem,
        Builtin::FCmpOEq,
        Builtin::FCmpONe,
        Builtin::FCmpOLt,
        Builtin::FCmpOLe,
        Builtin::FCmpOGt,
        Builtin::FCmpOGe,
    ] {
        table.insert(op, real2);
    }

    let real1 = BuiltinSignature::new(1, &[Real], ArgMode::Auto, Plain);
    for op in [
        Builtin::Sqrt,
        Builtin::Sin,
        Builtin::Cos,
        Builtin::Exp,
        Builtin::Log,
        Builtin::Floor,
        Builtin::FAbs,
    ] {
        table.insert(op, real1);
    }
    table.insert(
        Builtin::Fma,
        BuiltinSignature::new(3, &[Real], ArgMode::Auto, Plain),
    );

    table.insert(
        Builtin::Bitcast,
        BuiltinSignature::new(2, &[Any, TypeConstant], ArgMode::Auto, ViewOfOperands),
    );
    table.insert(
        Builtin::IntToPtr,
        BuiltinSignature::new(2, &[Integer, TypeConstant], ArgMode::Auto, Plain),
    );
    table.insert(
        Builtin::PtrToInt,
        BuiltinSignature::new(2, &[Pointer, TypeConstant], ArgMode::Auto, Plain),
    );
    for op in [Builtin::ITrunc, Builtin::ZExt, Builtin::SExt] {
        table.insert(
            op,
            BuiltinSignature::new(2, &[Integer, TypeConstant], ArgMode::Auto, Plain),
        );
    }
    table.insert(
        Builtin::FPToSI,
        BuiltinSignature::new(2, &[Real, TypeConstant], ArgMode::Auto, Plain),
    );
    table.insert(
        Builtin::SIToFP,
        BuiltinSignature::new(2, &[Integer, TypeConstant], ArgMode::Auto, Plain),
    );

    table.insert(
        Builtin::ExtractValue,
        BuiltinSignature::new(
            2,
            &[Aggregate, IntegerConstant],
            ArgMode::Auto,
            ViewOfOperands,
        ),
    );
    table.insert(
        Builtin::InsertValue,
        BuiltinSignature::new(
            3,
            &[Aggregate, Any, IntegerConstant],
            ArgMode::Auto,
            Plain,
        ),
    );
    table.insert(
        Builtin::Undef,
        BuiltinSignature::new(1, &[TypeConstant], ArgMode::View, Plain),
    );
    table.insert(
        Builtin::TypeOf,
        BuiltinSignature::new(1, &[Any], ArgMode::View, Plain),
    );

    table.insert(
        Builtin::Malloc,
        BuiltinSignature::new(1, &[TypeConstant], ArgMode::View, Unique),
    );
    table.insert(
        Builtin::Free,
        BuiltinSignature::new(1, &[Pointer], ArgMode::Move, Plain),
    );
    table.insert(
        Builtin::Load,
        BuiltinSignature::new(1, &[Pointer], ArgMode::Auto, Plain),
    );
    table.insert(
        Builtin::Store,
        BuiltinSignature::new(2, &[Any, Pointer], ArgMode::Auto, Plain),
    );
    table.insert(
        Builtin::RefToPtr,
        BuiltinSignature::new(1, &[Reference], ArgMode::View, ViewOfOperands),
    );
    table.insert(
        Builtin::PtrToRef,
        BuiltinSignature::new(1, &[Pointer], ArgMode::View, ViewOfOperands),
    );

    table.insert(
        Builtin::Move,
        BuiltinSignature::new(1, &[Any], ArgMode::Move, Unique),
    );
    table.insert(
        Builtin::View,
        BuiltinSignature::new(1, &[Any], ArgMode::View, ViewOfOperands),
    );
    table.insert(
        Builtin::Drop,
        BuiltinSignature::new(1, &[Any], ArgMode::View, Plain),
    );
    table.insert(
        Builtin::Lose,
        BuiltinSignature::new(1, &[Any], ArgMode::Move, Plain),
    );

    for op in [
        Builtin::Return,
        Builtin::Raise,
        Builtin::Break,
        Builtin::Repeat,
    ] {
        table.insert(op, BuiltinSignature::variadic(0, &[Any], ArgMode::Auto));
    }

    table
});

impl Builtin {
    pub fn signature(self) -> &'static BuiltinSignature {
        &BUILTIN_TABLE[&self]
    }

    pub fn is_control(self) -> bool {
        matches!(
            self,
            Builtin::Return | Builtin::Raise | Builtin::Break | Builtin::Repeat
        )
    }

    fn is_comparison(self) -> bool {
        matches!(
            self,
            Builtin::ICmpEq
                | Builtin::ICmpNe
                | Builtin::ICmpSLt
                | Builtin::ICmpSLe
                | Builtin::ICmpSGt
                | Builtin::ICmpSGe
                | Builtin::ICmpULt
                | Builtin::ICmpUGt
                | Builtin::FCmpOEq
                | Builtin::FCmpONe
                | Builtin::FCmpOLt
                | Builtin::FCmpOLe
                | Builtin::FCmpOGt
                | Builtin::FCmpOGe
        )
    }
}

impl Session {
    /// Dispatches a call to a builtin operator. `args` have already been
    /// flattened; control transfer operators never return a value.
    pub(crate) fn prove_builtin(
        &mut self,
        ctx: &ASTContext,
        builtin: Builtin,
        args: Vec<Operand>,
        anchor: Anchor,
    ) -> Result<ValueId> {
        log::trace!("builtin {builtin} with {} argument(s)", args.len());

        let signature = builtin.signature();
        if args.len() < signature.min || signature.max.is_some_and(|max| args.len() > max) {
            return fail(
                ProveErrorKind::InvalidBuiltinArgumentCount {
                    builtin,
                    min: signature.min,
                    max: signature.max,
                    actual: args.len(),
                },
                anchor,
            );
        }

        for (index, arg) in args.iter().enumerate() {
            self.verify_arg_kind(builtin, index, signature.kind_at(index), arg.value)?;
        }

        match builtin {
            Builtin::Return => return self.prove_return(ctx, args, anchor, false),
            Builtin::Raise => return self.prove_return(ctx, args, anchor, true),
            Builtin::Break => return self.prove_break(ctx, args, anchor),
            Builtin::Repeat => return self.prove_repeat(ctx, args, anchor),
            Builtin::Drop => return self.prove_explicit_drop(ctx, &args[0], anchor),
            _ => {}
        }

        let ty = self.builtin_result_type(builtin, &args)?;

        // typeof is answered at compile time and never emitted
        if builtin == Builtin::TypeOf {
            let type_type = self.types.type_type();
            return Ok(self.push_value(ValueKind::ConstType(ty), type_type, anchor));
        }

        let view_ids = match signature.result {
            ResultQualifier::ViewOfOperands => self.operand_ids(&args),
            ResultQualifier::Plain | ResultQualifier::Unique => IdSet::new(),
        };

        let pending = self.apply_modes(ctx, &args, |_| signature.mode, &view_ids, anchor)?;

        let arg_values = args.iter().map(|arg| arg.value).collect();
        let value = self.push_instruction(
            ctx,
            InstructionKind::Builtin {
                op: builtin,
                args: arg_values,
            },
            ty.clone(),
            anchor,
        );

        match signature.result {
            ResultQualifier::Plain => {}
            // moving an untracked value leaves it untracked
            ResultQualifier::Unique
                if builtin == Builtin::Move && self.operand_ids(&args).is_empty() => {}
            ResultQualifier::Unique => {
                let id = self.allocate_unique(ctx, value);
                self.values[value].ty = self.types.unique_type(&ty, id);
            }
            ResultQualifier::ViewOfOperands => {
                self.values[value].ty = self.types.view_type(&ty, view_ids);
            }
        }

        self.finish_auto_drops(ctx, pending, anchor)?;

        Ok(value)
    }

    fn verify_arg_kind(
        &self,
        builtin: Builtin,
        index: usize,
        kind: ArgKind,
        value: ValueId,
    ) -> Result<()> {
        let TypedValue { ty, anchor, .. } = &self.values[value];
        let storage = match &**ty.base() {
            TypeKind::Typename { .. } => self.types.storage_type(ty).at(*anchor)?,
            _ => ty.base().clone(),
        };

        let ok = match kind {
            ArgKind::Any => !ty.is_noreturn(),
            ArgKind::Integer => match &*storage {
                TypeKind::Integer { .. } => true,
                TypeKind::Vector { element, .. } => matches!(&**element, TypeKind::Integer { .. }),
                _ => false,
            },
            ArgKind::Real => match &*storage {
                TypeKind::Real { .. } => true,
                TypeKind::Vector { element, .. } => matches!(&**element, TypeKind::Real { .. }),
                _ => false,
            },
            ArgKind::Pointer => matches!(&*storage, TypeKind::Pointer { .. }),
            ArgKind::Reference => ty.refer().is_some(),
            ArgKind::Aggregate => matches!(
                &*storage,
                TypeKind::Tuple { .. }
                    | TypeKind::Array { .. }
                    | TypeKind::Vector { .. }
                    | TypeKind::Union { .. }
            ),
            ArgKind::TypeConstant => matches!(self.values[value].kind, ValueKind::ConstType(_)),
            ArgKind::IntegerConstant => matches!(self.values[value].kind, ValueKind::ConstInt(_)),
        };

        if !ok {
            return fail(
                ProveErrorKind::InvalidBuiltinArgument {
                    builtin,
                    index,
                    expected: kind,
                    actual: ty.clone(),
                },
                *anchor,
            );
        }

        Ok(())
    }

    fn type_constant(&self, arg: &Operand) -> Result<Type> {
        match &self.values[arg.value].kind {
            ValueKind::ConstType(ty) => Ok(ty.clone()),
            _ => fail(ProveErrorKind::ExpectedConstant("type"), arg.anchor),
        }
    }

    fn integer_constant(&self, arg: &Operand) -> Result<i128> {
        match &self.values[arg.value].kind {
            ValueKind::ConstInt(value) => Ok(*value),
            _ => fail(ProveErrorKind::ExpectedConstant("integer"), arg.anchor),
        }
    }

    fn element_at(&self, aggregate: &Type, index: &Operand) -> Result<Type> {
        let position = self.integer_constant(index)?;
        let storage = self.types.storage_type(aggregate).at(index.anchor)?;

        let element = usize::try_from(position)
            .ok()
            .and_then(|position| match &*storage {
                TypeKind::Tuple { fields, .. } | TypeKind::Union { fields } => {
                    fields.get(position).cloned()
                }
                TypeKind::Array { element, count } | TypeKind::Vector { element, count } => {
                    ((position as u64) < *count).then(|| element.clone())
                }
                _ => None,
            });

        match element {
            Some(element) => Ok(element),
            None => fail(
                ProveErrorKind::ArgumentIndexOutOfRange {
                    index: usize::try_from(position).unwrap_or(usize::MAX),
                    ty: aggregate.clone(),
                },
                index.anchor,
            ),
        }
    }

    /// Computes the unqualified result type. Argument kinds have already been
    /// verified against the table.
    fn builtin_result_type(&mut self, builtin: Builtin, args: &[Operand]) -> Result<Type> {
        let arg_type = |session: &Self, index: usize| session.values[args[index].value].ty.clone();

        if builtin.is_comparison() {
            let (lhs, rhs) = (arg_type(self, 0), arg_type(self, 1));
            self.verify_same_base(1, &lhs, &rhs, args[1].anchor)?;

            let boolean = self.types.bool();
            return Ok(match &*self.types.storage_type(&lhs).at(args[0].anchor)? {
                TypeKind::Vector { count, .. } => {
                    self.types.vector(boolean, *count).at(args[0].anchor)?
                }
                _ => boolean,
            });
        }

        let ty = match builtin {
            Builtin::Add
            | Builtin::Sub
            | Builtin::Mul
            | Builtin::SDiv
            | Builtin::UDiv
            | Builtin::SRem
            | Builtin::URem
            | Builtin::Shl
            | Builtin::LShr
            | Builtin::AShr
            | Builtin::BAnd
            | Builtin::BOr
            | Builtin::BXor
            | Builtin::FAdd
            | Builtin::FSub
            | Builtin::FMul
            | Builtin::FDiv
            | Builtin::FRem
            | Builtin::Fma => {
                let first = arg_type(self, 0);
                for (index, arg) in args.iter().enumerate().skip(1) {
                    let other = arg_type(self, index);
                    self.verify_same_base(index, &first, &other, arg.anchor)?;
                }
                first
            }
            Builtin::Sqrt
            | Builtin::Sin
            | Builtin::Cos
            | Builtin::Exp
            | Builtin::Log
            | Builtin::Floor
            | Builtin::FAbs => arg_type(self, 0),
            Builtin::Bitcast
            | Builtin::IntToPtr
            | Builtin::PtrToInt
            | Builtin::ITrunc
            | Builtin::ZExt
            | Builtin::SExt
            | Builtin::FPToSI
            | Builtin::SIToFP => self.type_constant(&args[1])?,
            Builtin::ExtractValue => self.element_at(&arg_type(self, 0), &args[1])?,
            Builtin::InsertValue => {
                let aggregate = arg_type(self, 0);
                let expected = self.element_at(&aggregate, &args[2])?;
                self.verify_same_base(1, &expected, &arg_type(self, 1), args[1].anchor)?;
                aggregate
            }
            Builtin::Undef => self.type_constant(&args[0])?,
            Builtin::Malloc => {
                let element = self.type_constant(&args[0])?;
                self.types
                    .pointer(element, PointerFlags::NONE, StorageClass::Generic)
            }
            Builtin::TypeOf => arg_type(self, 0),
            Builtin::Free | Builtin::Store | Builtin::Lose => self.types.empty_arguments(),
            Builtin::Load => {
                let pointer = arg_type(self, 0);
                match &*self.types.storage_type(&pointer).at(args[0].anchor)? {
                    TypeKind::Pointer { element, .. } => element.clone(),
                    _ => unreachable!("argument kind was verified"),
                }
            }
            Builtin::RefToPtr => {
                let reference = arg_type(self, 0);
                let Some(refer) = reference.refer().copied() else {
                    unreachable!("argument kind was verified")
                };
                let element = self.types.strip_refer(&reference);
                let element = self.types.strip_ownership(&element);
                self.types.pointer(element, refer.flags, refer.storage)
            }
            Builtin::PtrToRef => {
                let pointer = arg_type(self, 0);
                match &*self.types.storage_type(&pointer).at(args[0].anchor)? {
                    TypeKind::Pointer {
                        element,
                        flags,
                        storage,
                    } => self.types.refer_type(element, *flags, *storage),
                    _ => unreachable!("argument kind was verified"),
                }
            }
            Builtin::Move | Builtin::View => arg_type(self, 0),
            Builtin::Drop | Builtin::Return | Builtin::Raise | Builtin::Break | Builtin::Repeat => {
                unreachable!("{builtin} is handled before result typing")
            }
            Builtin::ICmpEq
            | Builtin::ICmpNe
            | Builtin::ICmpSLt
            | Builtin::ICmpSLe
            | Builtin::ICmpSGt
            | Builtin::ICmpSGe
            | Builtin::ICmpULt
            | Builtin::ICmpUGt
            | Builtin::FCmpOEq
            | Builtin::FCmpONe
            | Builtin::FCmpOLt
            | Builtin::FCmpOLe
            | Builtin::FCmpOGt
            | Builtin::FCmpOGe => unreachable!("comparisons are typed above"),
        };

        Ok(self.types.strip_ownership(&ty))
    }

    fn verify_same_base(
        &self,
        index: usize,
        expected: &Type,
        actual: &Type,
        anchor: Anchor,
    ) -> Result<()> {
        if expected.base() != actual.base() {
            return fail(
                ProveErrorKind::ArgumentTypeMismatch {
                    index,
                    expected: expected.base().clone(),
                    actual: actual.base().clone(),
                },
                anchor,
            );
        }

        Ok(())
    }

    /// The ids owned or viewed by `args`, used for results which borrow their
    /// operands
    pub(crate) fn operand_ids(&self, args: &[Operand]) -> IdSet {
        let mut ids = IdSet::new();
        for arg in args {
            match self.values[arg.value].ty.ownership() {
                Some(Ownership::Unique(id)) if !id.is_reserved() => {
                    ids.insert(*id);
                }
                Some(Ownership::View(viewed)) => ids = ids.union(viewed),
                _ => {}
            }
        }
        ids
    }
}
