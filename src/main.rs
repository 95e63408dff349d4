//! VM Scheduler - command script driver
//!
//! Usage: rust-vm-scheduler [OPTIONS] <script_file> [output_file]
//!
//! Arguments:
//!   script_file - Commands to run, one per line (`#` starts a comment)
//!   output_file - File to write one result per command (stdout if omitted)
//!
//! Options:
//!   -c, --config <file>  Load `key = value` settings
//!   -v, --verbose        Log events to stderr (repeat for more detail)
//!   -h, --help           Print help information

use std::env;
use std::process;

use log::{LevelFilter, Log, Metadata, Record, info};

use vm_scheduler::config::SystemConfig;
use vm_scheduler::error::VmError;
use vm_scheduler::io::{Command, read_script, write_results};
use vm_scheduler::page_table::SegmentKind;
use vm_scheduler::process::{Pid, Priority};
use vm_scheduler::snapshot;
use vm_scheduler::system::SystemContext;

/// Command-line configuration
struct Config {
    script_file: String,
    output_file: Option<String>,
    config_file: Option<String>,
    verbosity: u8,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    init_logging(config.verbosity);

    if let Err(e) = run(&config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn print_help(program: &str) {
    eprintln!("VM Scheduler - paged memory and priority scheduling simulator");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] <script_file> [output_file]", program);
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  script_file - Commands to run, one per line");
    eprintln!("  output_file - Output file for command results (stdout if omitted)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <file>  Load key = value settings");
    eprintln!("  -v, --verbose        Log events to stderr (-vv debug, -vvv trace)");
    eprintln!("  -h, --help           Print this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} script.txt", program);
    eprintln!("  {} -vv -c small.conf script.txt results.txt", program);
}

fn parse_args() -> Result<Config, String> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("rust-vm-scheduler");

    let mut verbosity = 0u8;
    let mut config_file = None;
    let mut positional: Vec<&String> = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help(program);
                process::exit(0);
            }
            "-v" | "--verbose" => verbosity = verbosity.saturating_add(1),
            "-vv" => verbosity = verbosity.saturating_add(2),
            "-vvv" => verbosity = verbosity.saturating_add(3),
            "-c" | "--config" => {
                let file = iter.next().ok_or_else(|| format!("{} needs a file argument", arg))?;
                config_file = Some(file.clone());
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}\nUse --help for usage information.", arg));
            }
            _ => positional.push(arg),
        }
    }

    if positional.is_empty() || positional.len() > 2 {
        print_help(program);
        return Err(format!("\nError: Expected 1 or 2 arguments, got {}", positional.len()));
    }

    Ok(Config {
        script_file: positional[0].clone(),
        output_file: positional.get(1).map(|s| s.to_string()),
        config_file,
        verbosity,
    })
}

/// Main logic separated from main() for cleaner error handling
fn run(config: &Config) -> Result<(), String> {
    let system_config = match &config.config_file {
        Some(path) => SystemConfig::from_file(path).map_err(|e| e.to_string())?,
        None => SystemConfig::default(),
    };
    let mut ctx = SystemContext::new(system_config).map_err(|e| e.to_string())?;

    let commands = read_script(&config.script_file)?;
    info!("running {} commands from {}", commands.len(), config.script_file);

    let results: Vec<String> = commands
        .iter()
        .map(|command| match execute(&mut ctx, command) {
            Ok(line) => line,
            Err(e) => format!("error: {}", e),
        })
        .collect();

    match &config.output_file {
        Some(path) => {
            write_results(path, &results)?;
            info!("results written to {}", path);
        }
        None => {
            for line in &results {
                println!("{}", line);
            }
        }
    }

    ctx.shutdown().map_err(|e| e.to_string())
}

fn describe_running(running: Option<Pid>) -> String {
    match running {
        Some(pid) => format!("running pid {}", pid),
        None => "idle".to_string(),
    }
}

fn execute(ctx: &mut SystemContext, command: &Command) -> Result<String, VmError> {
    let line = match command {
        Command::Create { name, priority, code_pages, data_pages } => {
            let priority = Priority::new(*priority)?;
            let pid = ctx.create_process(name, priority, *code_pages, *data_pages)?;
            format!("created pid {}", pid)
        }
        Command::Kill(pid) => {
            if ctx.process_destroy(Pid(*pid))? {
                format!("killed pid {}", pid)
            } else {
                format!("pid {} already gone", pid)
            }
        }
        Command::SetPriority { pid, priority } => {
            let priority = Priority::new(*priority)?;
            ctx.set_priority(Pid(*pid), priority)?;
            format!("pid {} priority {}", pid, priority)
        }
        Command::Block(pid) => {
            ctx.block_process(Pid(*pid))?;
            format!("blocked pid {}", pid)
        }
        Command::Unblock(pid) => {
            ctx.unblock_process(Pid(*pid))?;
            format!("unblocked pid {}", pid)
        }
        Command::List => {
            let rows: Vec<String> = ctx
                .processes()
                .iter()
                .map(|pcb| {
                    format!(
                        "pid {} {} {} prio {} resident {}/{}",
                        pcb.pid,
                        pcb.name,
                        pcb.state.name(),
                        pcb.priority,
                        pcb.present_pages(),
                        pcb.total_pages()
                    )
                })
                .collect();
            if rows.is_empty() { "no processes".to_string() } else { rows.join("\n") }
        }
        Command::Info(pid) => {
            let pcb = ctx.get_process_by_pid(Pid(*pid)).ok_or(VmError::InvalidProcess(Pid(*pid)))?;
            let s = &pcb.stats;
            format!(
                concat!(
                    "pid {} {} {} prio {} slice {}/{} accesses {} faults {} ",
                    "swap-in {} swap-out {} ticks {} preemptions {}"
                ),
                pcb.pid,
                pcb.name,
                pcb.state.name(),
                pcb.priority,
                pcb.time_slice,
                pcb.time_slice_total,
                s.memory_accesses,
                s.page_faults,
                s.swap_ins,
                s.swap_outs,
                s.cpu_ticks,
                s.preemptions
            )
        }
        Command::Read { pid, addr, len } => {
            let bytes = ctx.read_memory(Pid(*pid), *addr, *len)?;
            let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            hex.join(" ")
        }
        Command::Write { pid, addr, text } => {
            ctx.write_memory(Pid(*pid), *addr, text.as_bytes())?;
            format!("wrote {} bytes", text.len())
        }
        Command::MemStat => {
            let st = ctx.get_memory_stats();
            format!(
                concat!(
                    "frames {}/{} free, swap {}/{} free, accesses {}, faults {}, ",
                    "replacements {}, swap-in {}, swap-out {}, disk r/w {}/{}"
                ),
                st.free_frames,
                st.total_frames,
                st.swap_free_blocks,
                st.swap_blocks,
                st.total_accesses,
                st.page_faults,
                st.page_replacements,
                st.swap_ins,
                st.swap_outs,
                st.disk_reads,
                st.disk_writes
            )
        }
        Command::MemMap(pid) => {
            let pcb = ctx.get_process_by_pid(Pid(*pid)).ok_or(VmError::InvalidProcess(Pid(*pid)))?;
            let rows: Vec<String> = pcb
                .page_table
                .iter()
                .map(|(page, pte)| {
                    let segment = pcb.layout.segment_of(page).map(SegmentKind::name).unwrap_or("?");
                    let location = match (pte.frame(), pte.swap_index()) {
                        (Some(frame), _) => {
                            let dirty = if pte.is_dirty() { " dirty" } else { "" };
                            format!("frame {}{}", frame, dirty)
                        }
                        (None, Some(block)) => format!("swap {}", block),
                        (None, None) => "unmapped".to_string(),
                    };
                    format!("page {} {} {}", page, segment, location)
                })
                .collect();
            rows.join("\n")
        }
        Command::PageIn { pid, page } => {
            let frame = ctx.page_in(Pid(*pid), *page)?;
            format!("pid {} page {} in frame {}", pid, page, frame)
        }
        Command::PageOut { pid, page } => {
            let block = ctx.page_out(Pid(*pid), *page)?;
            format!("pid {} page {} in swap block {}", pid, page, block)
        }
        Command::SwapList => {
            let rows: Vec<String> = ctx
                .get_swap_blocks()
                .iter()
                .enumerate()
                .filter(|(_, block)| block.used)
                .map(|(idx, block)| match block.owner {
                    Some(owner) => {
                        format!("block {} pid {} page {}", idx, owner, block.virtual_page)
                    }
                    None => format!("block {} unowned", idx),
                })
                .collect();
            if rows.is_empty() { "swap empty".to_string() } else { rows.join("\n") }
        }
        Command::SwapClean => format!("freed {} swap blocks", ctx.swap_clean()),
        Command::Tick(n) => describe_running(ctx.time_ticks(*n)?),
        Command::Schedule => describe_running(ctx.schedule()?),
        Command::Run(pid) => {
            ctx.set_running_process(Pid(*pid))?;
            describe_running(Some(Pid(*pid)))
        }
        Command::Check => {
            ctx.check_state()?;
            "state consistent".to_string()
        }
        Command::Reset => {
            ctx.reset()?;
            "reset".to_string()
        }
        Command::Save(path) => {
            snapshot::save_to_file(ctx, path)?;
            format!("saved to {}", path)
        }
        Command::Load(path) => {
            *ctx = snapshot::load_from_file(path)?;
            format!("loaded {} processes from {}", ctx.get_total_processes(), path)
        }
    };
    Ok(line)
}
