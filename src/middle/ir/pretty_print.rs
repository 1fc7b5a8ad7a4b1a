use colored::Colorize;
use itertools::Itertools;

use crate::{
    middle::{
        ir::{BlockId, FunctionId, InstructionKind, SwitchArm, ValueId, ValueKind},
        ty::TypeKind,
    },
    session::Session,
};

/// Displays a specialized function as nested blocks of instructions
pub struct DisplayFunction<'a> {
    session: &'a Session,
    function: FunctionId,
}

impl Session {
    pub fn display_function(&self, function: FunctionId) -> DisplayFunction<'_> {
        DisplayFunction {
            session: self,
            function,
        }
    }

    pub fn dump_function(&self, function: FunctionId) -> String {
        self.display_function(function).to_string()
    }
}

impl core::fmt::Display for DisplayFunction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.session;
        let function = &session.functions[self.function];

        write!(
            f,
            "{} {}{}",
            "fn".magenta(),
            function.name.to_string().blue(),
            "(".white()
        )?;
        write!(
            f,
            "{}",
            function
                .params
                .iter()
                .map(|param| format!("{}: {}", register(*param), session.values[*param].ty))
                .join(", ")
        )?;
        write!(f, "{}", ")".white())?;

        if let Some(signature) = &function.signature
            && let TypeKind::Function {
                return_type,
                raises,
                ..
            } = &**signature
        {
            write!(f, " -> {return_type}")?;
            if let Some(raises) = raises {
                write!(f, " {} {raises}", "raises".magenta())?;
            }
        }

        writeln!(f, " {}", "{".white())?;
        self.block(f, function.body, 1)?;
        write!(f, "{}", "}".white())
    }
}

fn register(value: ValueId) -> colored::ColoredString {
    format!("%{value}").yellow()
}

impl DisplayFunction<'_> {
    fn block(&self, f: &mut std::fmt::Formatter<'_>, block: BlockId, depth: usize) -> std::fmt::Result {
        let block = &self.session.blocks[block];

        for value in block.body.iter().chain(&block.terminator) {
            self.instruction(f, *value, depth)?;
        }

        Ok(())
    }

    /// Prints the nested block followed by the closing brace
    fn nested(&self, f: &mut std::fmt::Formatter<'_>, block: BlockId, depth: usize) -> std::fmt::Result {
        writeln!(f, "{}", "{".white())?;
        self.block(f, block, depth + 1)?;
        write!(f, "{}{}", "    ".repeat(depth), "}".white())
    }

    fn instruction(&self, f: &mut std::fmt::Formatter<'_>, value: ValueId, depth: usize) -> std::fmt::Result {
        let session = self.session;
        let ValueKind::Instruction(instruction) = &session.values[value].kind else {
            return Ok(());
        };

        write!(f, "{}", "    ".repeat(depth))?;
        if !instruction.kind.is_terminator() {
            write!(
                f,
                "{}: {} {} ",
                register(value),
                session.values[value].ty,
                "=".white()
            )?;
        }

        match &instruction.kind {
            InstructionKind::Call { callee, args } => write!(
                f,
                "{} {}({})",
                "call".cyan(),
                self.operand(*callee),
                args.iter().map(|arg| self.operand(*arg)).join(", ")
            )?,
            InstructionKind::Builtin { op, args } => {
                write!(f, "{}", op.to_string().cyan())?;
                for arg in args {
                    write!(f, " {}", self.operand(*arg))?;
                }
            }
            InstructionKind::Label { name, body, .. } => {
                write!(f, "{} {} ", "label".cyan(), name.to_string().blue())?;
                self.nested(f, *body, depth)?;
            }
            InstructionKind::CondBr {
                condition,
                then_body,
                else_body,
            } => {
                write!(f, "{} {} ", "condbr".cyan(), self.operand(*condition))?;
                self.nested(f, *then_body, depth)?;
                write!(f, " {} ", "else".cyan())?;
                self.nested(f, *else_body, depth)?;
            }
            InstructionKind::Switch { expr, arms } => {
                writeln!(
                    f,
                    "{} {} {}",
                    "switch".cyan(),
                    self.operand(*expr),
                    "{".white()
                )?;
                for arm in arms {
                    self.arm(f, arm, depth + 1)?;
                }
                write!(f, "{}{}", "    ".repeat(depth), "}".white())?;
            }
            InstructionKind::LoopLabel { init, args, body, .. } => {
                write!(
                    f,
                    "{} {} = ({}) ",
                    "loop".cyan(),
                    register(*args),
                    init.iter().map(|value| self.operand(*value)).join(", ")
                )?;
                self.nested(f, *body, depth)?;
            }
            InstructionKind::Merge { label, value } => {
                write!(f, "{} {} {}", "merge".cyan(), register(*label), self.operand(*value))?
            }
            InstructionKind::Repeat { loop_label, value } => write!(
                f,
                "{} {} {}",
                "repeat".cyan(),
                register(*loop_label),
                self.operand(*value)
            )?,
            InstructionKind::Return { value } => {
                write!(f, "{} {}", "return".cyan(), self.operand(*value))?
            }
            InstructionKind::Raise { value } => {
                write!(f, "{} {}", "raise".cyan(), self.operand(*value))?
            }
        }

        writeln!(f)
    }

    fn arm(&self, f: &mut std::fmt::Formatter<'_>, arm: &SwitchArm, depth: usize) -> std::fmt::Result {
        write!(f, "{}", "    ".repeat(depth))?;
        match arm.literal {
            Some(literal) => write!(
                f,
                "{} {} ",
                (if arm.pass { "pass" } else { "case" }).cyan(),
                literal.to_string().purple()
            )?,
            None => write!(f, "{} ", "default".cyan())?,
        }
        self.nested(f, arm.body, depth)?;
        writeln!(f)
    }

    /// Constants and multi-values are printed in place, everything else by
    /// register
    fn operand(&self, value: ValueId) -> String {
        let session = self.session;

        match &session.values[value].kind {
            ValueKind::ConstInt(int) => int.to_string().purple().to_string(),
            ValueKind::ConstReal(real) => real.to_string().purple().to_string(),
            ValueKind::ConstNull => "null".purple().to_string(),
            ValueKind::ConstType(ty) => ty.to_string(),
            ValueKind::Extern(name) => format!("@{name}").blue().to_string(),
            ValueKind::Builtin(builtin) => builtin.to_string().cyan().to_string(),
            ValueKind::Function(function) => format!("@{}", session.functions[*function].name)
                .blue()
                .to_string(),
            ValueKind::Closure { template, .. } => match session.nodes.as_template(*template) {
                Some(definition) => format!("#{}", definition.name).blue().to_string(),
                None => register(value).to_string(),
            },
            ValueKind::ArgumentList(values) => format!(
                "({})",
                values.iter().map(|value| self.operand(*value)).join(", ")
            ),
            ValueKind::ExtractArgument { value, index } => {
                format!("{}.{index}", self.operand(*value))
            }
            ValueKind::Keyed { key, value } => format!("{key} = {}", self.operand(*value)),
            ValueKind::Parameter { .. }
            | ValueKind::LoopArguments { .. }
            | ValueKind::Instruction(_) => register(value).to_string(),
        }
    }
}
