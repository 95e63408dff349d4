use std::fs;
use std::path::Path;

/// One line of a command script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { name: String, priority: u8, code_pages: u32, data_pages: u32 },
    Kill(u32),
    SetPriority { pid: u32, priority: u8 },
    Block(u32),
    Unblock(u32),
    List,
    Info(u32),
    Read { pid: u32, addr: u32, len: usize },
    Write { pid: u32, addr: u32, text: String },
    MemStat,
    MemMap(u32),
    PageIn { pid: u32, page: u32 },
    PageOut { pid: u32, page: u32 },
    SwapList,
    SwapClean,
    Tick(u32),
    Schedule,
    Run(u32),
    Check,
    Reset,
    Save(String),
    Load(String),
}

/// Decimal or `0x` hexadecimal
fn parse_number(token: &str, what: &str) -> Result<u64, String> {
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => token.parse(),
    };
    parsed.map_err(|_| format!("Invalid {}: {}", what, token))
}

fn parse_u32(token: &str, what: &str) -> Result<u32, String> {
    let n = parse_number(token, what)?;
    u32::try_from(n).map_err(|_| format!("{} out of range: {}", what, token))
}

fn parse_u8(token: &str, what: &str) -> Result<u8, String> {
    let n = parse_number(token, what)?;
    u8::try_from(n).map_err(|_| format!("{} out of range: {}", what, token))
}

fn expect_args(tokens: &[&str], count: usize, usage: &str) -> Result<(), String> {
    if tokens.len() != count {
        return Err(format!("usage: {}", usage));
    }
    Ok(())
}

/// Parse a single non-empty, non-comment line
pub fn parse_command(line: &str) -> Result<Command, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let command = match tokens.as_slice() {
        ["proc", "create", rest @ ..] => {
            expect_args(rest, 4, "proc create <name> <prio> <code> <data>")?;
            Command::Create {
                name: rest[0].to_string(),
                priority: parse_u8(rest[1], "priority")?,
                code_pages: parse_u32(rest[2], "code pages")?,
                data_pages: parse_u32(rest[3], "data pages")?,
            }
        }
        ["proc", "kill", rest @ ..] => {
            expect_args(rest, 1, "proc kill <pid>")?;
            Command::Kill(parse_u32(rest[0], "pid")?)
        }
        ["proc", "prio", rest @ ..] => {
            expect_args(rest, 2, "proc prio <pid> <prio>")?;
            Command::SetPriority {
                pid: parse_u32(rest[0], "pid")?,
                priority: parse_u8(rest[1], "priority")?,
            }
        }
        ["proc", "block", rest @ ..] => {
            expect_args(rest, 1, "proc block <pid>")?;
            Command::Block(parse_u32(rest[0], "pid")?)
        }
        ["proc", "unblock", rest @ ..] => {
            expect_args(rest, 1, "proc unblock <pid>")?;
            Command::Unblock(parse_u32(rest[0], "pid")?)
        }
        ["proc", "list"] => Command::List,
        ["proc", "info", rest @ ..] => {
            expect_args(rest, 1, "proc info <pid>")?;
            Command::Info(parse_u32(rest[0], "pid")?)
        }
        ["mem", "read", rest @ ..] => {
            expect_args(rest, 3, "mem read <pid> <addr> <len>")?;
            Command::Read {
                pid: parse_u32(rest[0], "pid")?,
                addr: parse_u32(rest[1], "address")?,
                len: parse_number(rest[2], "length")? as usize,
            }
        }
        ["mem", "write", pid, addr, _, ..] => {
            // text keeps its inner spacing
            let text = rest_after_tokens(line, 4)
                .ok_or_else(|| "usage: mem write <pid> <addr> <text>".to_string())?;
            Command::Write { pid: parse_u32(pid, "pid")?, addr: parse_u32(addr, "address")?, text }
        }
        ["mem", "write", ..] => return Err("usage: mem write <pid> <addr> <text>".to_string()),
        ["mem", "stat"] => Command::MemStat,
        ["mem", "map", rest @ ..] => {
            expect_args(rest, 1, "mem map <pid>")?;
            Command::MemMap(parse_u32(rest[0], "pid")?)
        }
        ["vm", "page", dir @ ("in" | "out"), rest @ ..] => {
            expect_args(rest, 2, "vm page in|out <pid> <page>")?;
            let pid = parse_u32(rest[0], "pid")?;
            let page = parse_u32(rest[1], "page")?;
            if *dir == "in" {
                Command::PageIn { pid, page }
            } else {
                Command::PageOut { pid, page }
            }
        }
        ["vm", "swap", "list"] => Command::SwapList,
        ["vm", "swap", "clean"] => Command::SwapClean,
        ["time", "tick"] => Command::Tick(1),
        ["time", "tick", n] => Command::Tick(parse_u32(n, "tick count")?),
        ["sched"] => Command::Schedule,
        ["sched", "run", rest @ ..] => {
            expect_args(rest, 1, "sched run <pid>")?;
            Command::Run(parse_u32(rest[0], "pid")?)
        }
        ["check"] => Command::Check,
        ["reset"] => Command::Reset,
        ["save", path] => Command::Save(path.to_string()),
        ["load", path] => Command::Load(path.to_string()),
        _ => return Err(format!("Unknown command: {}", line.trim())),
    };
    Ok(command)
}

// Remainder of `line` after skipping `skip` whitespace-separated tokens
fn rest_after_tokens(line: &str, skip: usize) -> Option<String> {
    let mut rest = line.trim_start();
    for _ in 0..skip {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    let rest = rest.trim_end();
    if rest.is_empty() { None } else { Some(rest.to_string()) }
}

/// Parse a whole script. Blank lines and `#` comments are skipped; errors
/// carry the 1-based line number.
pub fn parse_script(content: &str) -> Result<Vec<Command>, String> {
    let mut commands = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command = parse_command(line).map_err(|e| format!("line {}: {}", idx + 1, e))?;
        commands.push(command);
    }
    Ok(commands)
}

pub fn read_script<P: AsRef<Path>>(path: P) -> Result<Vec<Command>, String> {
    let content = fs::read_to_string(path.as_ref())
        .map_err(|e| format!("Failed to read script file: {}", e))?;
    parse_script(&content)
}

pub fn write_results<P: AsRef<Path>>(path: P, results: &[String]) -> Result<(), String> {
    let mut content = results.join("\n");
    content.push('\n');
    fs::write(path.as_ref(), content).map_err(|e| format!("Failed to write output file: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process_commands() {
        assert_eq!(
            parse_command("proc create shell 1 4 2").unwrap(),
            Command::Create { name: "shell".into(), priority: 1, code_pages: 4, data_pages: 2 }
        );
        assert_eq!(parse_command("proc kill 3").unwrap(), Command::Kill(3));
        assert_eq!(
            parse_command("proc prio 3 0").unwrap(),
            Command::SetPriority { pid: 3, priority: 0 }
        );
        assert_eq!(parse_command("proc list").unwrap(), Command::List);
    }

    #[test]
    fn test_parse_memory_commands() {
        assert_eq!(
            parse_command("mem read 1 0x1008 16").unwrap(),
            Command::Read { pid: 1, addr: 0x1008, len: 16 }
        );
        assert_eq!(
            parse_command("mem write 2 40 hello  there world").unwrap(),
            Command::Write { pid: 2, addr: 40, text: "hello  there world".into() }
        );
        assert_eq!(parse_command("vm page out 1 3").unwrap(), Command::PageOut { pid: 1, page: 3 });
        assert_eq!(parse_command("vm swap clean").unwrap(), Command::SwapClean);
    }

    #[test]
    fn test_parse_time_and_misc() {
        assert_eq!(parse_command("time tick").unwrap(), Command::Tick(1));
        assert_eq!(parse_command("time tick 10").unwrap(), Command::Tick(10));
        assert_eq!(parse_command("sched").unwrap(), Command::Schedule);
        assert_eq!(parse_command("sched run 2").unwrap(), Command::Run(2));
        assert_eq!(parse_command("reset").unwrap(), Command::Reset);
        assert_eq!(parse_command("save /tmp/s.bin").unwrap(), Command::Save("/tmp/s.bin".into()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("proc create x 1 2").unwrap_err().starts_with("usage"));
        assert!(parse_command("mem write 1 0").unwrap_err().starts_with("usage"));
        assert_eq!(parse_command("proc kill abc").unwrap_err(), "Invalid pid: abc");
        assert_eq!(parse_command("proc prio 1 300").unwrap_err(), "priority out of range: 300");
        assert_eq!(parse_command("reboot").unwrap_err(), "Unknown command: reboot");
    }

    #[test]
    fn test_parse_script_skips_comments_and_numbers_errors() {
        let script = "# setup\nproc create a 0 1 1\n\n  mem stat\n";
        assert_eq!(
            parse_script(script).unwrap(),
            vec![
                Command::Create { name: "a".into(), priority: 0, code_pages: 1, data_pages: 1 },
                Command::MemStat,
            ]
        );

        let err = parse_script("check\nbogus line\n").unwrap_err();
        assert_eq!(err, "line 2: Unknown command: bogus line");
    }
}
