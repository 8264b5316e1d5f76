use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use rustyline::DefaultEditor;

use rv32i_emu::bus::Bus;
use rv32i_emu::cli::{parse_debug_flags, CliError};
use rv32i_emu::cpu::{Cpu, StepResult};
use rv32i_emu::decode::Decoder;
use rv32i_emu::disasm::disassemble;
use rv32i_emu::elf::load_elf;
use rv32i_emu::host::HostMemory;

/// Run a RISC-V RV32I executable in a user-mode emulator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// RAM size in KiB
    #[arg(short = 'm', long, default_value_t = 10 * 1024)]
    mem_kib: u32,

    /// Stack size in KiB
    #[arg(short = 's', long, default_value_t = 2 * 1024)]
    stack_kib: u32,

    /// Path to the ELF executable to run
    #[arg(short = 'f', long)]
    file: String,

    /// Debug flags: any of t(race) s(yscall) m(emory) r(egisters)
    /// i(nteractive) l(oad)
    #[arg(short = 'd', long, default_value = "")]
    debug: String,
}

/// Parse the debug flags and load the executable, producing a ready-to-run
/// VM. Everything that can fail here is a [`CliError`] (§6): a bad `-d`
/// string, or an ELF that fails to load.
fn start_vm(args: &Args) -> Result<(HostMemory, rv32i_emu::host::DebugFlags, u32), CliError> {
    let debug_flags = parse_debug_flags(&args.debug)?;

    let ram_size = args.mem_kib * 1024;
    let stack_size = args.stack_kib * 1024;
    let mut mem = HostMemory::new(ram_size, stack_size, debug_flags);

    let loaded = load_elf(&mut mem, &args.file, |vaddr, end, memsz| {
        if debug_flags.load {
            println!("segment loaded, {vaddr:#010x} - {end:#010x}, {memsz} bytes");
        }
    })?;

    Ok((mem, debug_flags, loaded.entry))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (mut mem, debug_flags, entry) = match start_vm(&args) {
        Ok(started) => started,
        Err(e) => {
            eprintln!("error: {e}");
            return match e {
                CliError::BadArgument(_) => ExitCode::from(1),
                CliError::Startup(_) => ExitCode::from(2),
            };
        }
    };

    let ram_size = args.mem_kib * 1024;
    let mut cpu = Cpu::new(entry);
    cpu.regs.set(2, ram_size - 4); // sp

    let decoder = Decoder::new();
    let mut rl = debug_flags.interactive.then(|| DefaultEditor::new().ok()).flatten();

    loop {
        if debug_flags.trace {
            match mem.read32(cpu.regs.pc) {
                Ok(word) => match disassemble(&decoder, word) {
                    Ok(text) => println!("{:#010x}: {text}", cpu.regs.pc),
                    Err(_) => println!("{:#010x}: <unable to decode>", cpu.regs.pc),
                },
                Err(_) => println!("{:#010x}: <unreadable>", cpu.regs.pc),
            }
        }

        if debug_flags.registers {
            let dump: Vec<String> = cpu.regs.dump().skip(1).map(|(_, v)| v.to_string()).collect();
            println!("{}", dump.join(" "));
        }

        if let Some(editor) = rl.as_mut() {
            let _ = editor.readline("");
        }

        match cpu.step(&mut mem) {
            StepResult::Success => {}
            StepResult::Halt(code) => {
                let _ = io::stdout().flush();
                return ExitCode::from(code);
            }
            StepResult::Error => {
                eprintln!("error: execution fault at pc={:#010x}", cpu.regs.pc);
                return ExitCode::from(2);
            }
            StepResult::WrongOpcode => {
                eprintln!(
                    "error: unable to decode instruction at pc={:#010x}",
                    cpu.regs.pc
                );
                return ExitCode::from(2);
            }
        }
    }
}
