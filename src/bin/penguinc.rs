//! The main compiler binary. Takes a Penguin source file and writes the
//! assembled RGBDS source for its compiled ROM, or dumps one of the
//! pipeline's intermediate stages instead.
//!
//! Run with `--help` for more info.

use clap::{Parser, ValueEnum};

use penguinc::back::codegen;
use penguinc::common::Map;
use penguinc::error::CompileError;
use penguinc::front::{check, lex::Lexer, parse};
use penguinc::middle::{lower, regalloc, rewrite};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the Penguin source file to compile
    input_path: String,
    /// where to write the assembled ROM source
    #[arg(default_value = "out.gb")]
    output_path: String,
    /// print one pipeline stage to stdout instead of writing the output file
    #[arg(long, value_enum)]
    dump: Option<Stage>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Stage {
    Tokens,
    Ast,
    Taast,
    Ir,
    #[value(name = "alloc-ir")]
    AllocIr,
    Asm,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), CompileError> {
    let input = std::fs::read_to_string(&args.input_path)
        .map_err(|e| CompileError::Internal { detail: format!("reading '{}': {e}", args.input_path) })?;

    if args.dump == Some(Stage::Tokens) {
        let mut lexer = Lexer::new(&input);
        while let Some(tok) = lexer.next()? {
            println!("{tok}");
        }
        return Ok(());
    }

    let ast = parse(&input)?;
    if args.dump == Some(Stage::Ast) {
        println!("{ast:#?}");
        return Ok(());
    }

    let procs = check(&ast)?;
    if args.dump == Some(Stage::Taast) {
        println!("{ast:#?}");
        return Ok(());
    }

    let ir = lower::lower(&ast, &procs)?;
    if args.dump == Some(Stage::Ir) {
        println!("{}", ir.dump());
        return Ok(());
    }

    if args.dump == Some(Stage::AllocIr) {
        println!("{}", dump_allocated(&ir));
        return Ok(());
    }

    let asm = codegen::generate(&ir);
    if args.dump == Some(Stage::Asm) {
        println!("{}", asm.asm_code());
        return Ok(());
    }

    std::fs::write(&args.output_path, asm.asm_code())
        .map_err(|e| CompileError::Internal { detail: format!("writing '{}': {e}", args.output_path) })?;
    Ok(())
}

/// Renders every procedure's instructions after register allocation and
/// spill rewriting, in the same shape as `ir::Program::dump`.
fn dump_allocated(ir: &penguinc::middle::ir::Program) -> String {
    let mut out = String::new();
    let main_proc = penguinc::middle::ir::Procedure {
        params: vec![],
        returns_value: false,
        instructions: ir.main.clone(),
    };
    out.push_str("// Main\n");
    append_rewritten(&mut out, &main_proc, &ir.globals);
    for (name, proc) in &ir.procedures {
        out.push_str(&format!("\n// Procedure {name}\n"));
        append_rewritten(&mut out, proc, &ir.globals);
    }
    out
}

fn append_rewritten(out: &mut String, proc: &penguinc::middle::ir::Procedure, globals: &Map<penguinc::common::Id, u16>) {
    let alloc = regalloc::allocate(proc, globals);
    let rewritten = rewrite::rewrite(proc, &alloc);
    for insn in &rewritten.instructions {
        out.push_str(&format!("{insn}\n"));
    }
}
