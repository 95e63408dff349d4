use std::fs;
use std::path::Path;

use crate::constants::*;
use crate::error::{Result, VmError};

/// Largest page count for memory, swap or one address space: every page
/// stays addressable by a `u32` address.
pub const MAX_PAGE_COUNT: usize = 1 << (32 - PAGE_SHIFT);

/// Runtime tunables for one simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    pub physical_pages: usize,
    pub swap_size: usize,
    pub max_process_pages: usize,
    pub max_processes: usize,
    /// Ticks granted to a running process before rotation
    pub time_slice: u32,
    /// Resident-page percentage enforced before a process gets the CPU
    pub min_resident_percent: u32,
    /// Processes at or below this resident percentage are not robbed of pages
    pub victim_floor_percent: u32,
    pub heap_pages: u32,
    pub stack_pages: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            physical_pages: PHYSICAL_PAGES,
            swap_size: SWAP_SIZE,
            max_process_pages: MAX_PROCESS_PAGES,
            max_processes: MAX_PROCESSES,
            time_slice: DEFAULT_TIME_SLICE,
            min_resident_percent: MIN_RESIDENT_PERCENT,
            victim_floor_percent: VICTIM_FLOOR_PERCENT,
            heap_pages: DEFAULT_HEAP_PAGES,
            stack_pages: DEFAULT_STACK_PAGES,
        }
    }
}

impl SystemConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| VmError::InvalidConfig(format!("failed to read config file: {}", e)))?;
        Self::parse(&content)
    }

    /// Parse `key = value` lines on top of the defaults.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = SystemConfig::default();

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = match raw.split_once('#') {
                Some((before, _)) => before,
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                VmError::InvalidConfig(format!("line {}: expected key = value", line_no))
            })?;
            let key = key.trim();
            let value = value.trim();
            let number: u64 = value.parse().map_err(|_| {
                VmError::InvalidConfig(format!(
                    "line {}: invalid number for {}: {}",
                    line_no, key, value
                ))
            })?;

            let too_big = || {
                VmError::InvalidConfig(format!("line {}: {} out of range: {}", line_no, key, value))
            };
            let size = || usize::try_from(number).map_err(|_| too_big());
            let small = || u32::try_from(number).map_err(|_| too_big());

            match key {
                "physical_pages" => config.physical_pages = size()?,
                "swap_size" => config.swap_size = size()?,
                "max_process_pages" => config.max_process_pages = size()?,
                "max_processes" => config.max_processes = size()?,
                "time_slice" => config.time_slice = small()?,
                "min_resident_percent" => config.min_resident_percent = small()?,
                "victim_floor_percent" => config.victim_floor_percent = small()?,
                "heap_pages" => config.heap_pages = small()?,
                "stack_pages" => config.stack_pages = small()?,
                _ => {
                    return Err(VmError::InvalidConfig(format!(
                        "line {}: unknown key {}",
                        line_no, key
                    )));
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.physical_pages == 0 {
            return Err(VmError::InvalidConfig("physical_pages must be non-zero".into()));
        }
        if self.swap_size == 0 {
            return Err(VmError::InvalidConfig("swap_size must be non-zero".into()));
        }
        if self.max_process_pages == 0 || self.max_processes == 0 {
            return Err(VmError::InvalidConfig("process limits must be non-zero".into()));
        }
        for (key, pages) in [
            ("physical_pages", self.physical_pages),
            ("swap_size", self.swap_size),
            ("max_process_pages", self.max_process_pages),
        ] {
            if pages > MAX_PAGE_COUNT {
                return Err(VmError::InvalidConfig(format!(
                    "{} must be at most {}",
                    key, MAX_PAGE_COUNT
                )));
            }
        }
        if self.time_slice == 0 {
            return Err(VmError::InvalidConfig("time_slice must be non-zero".into()));
        }
        if self.min_resident_percent > 100 || self.victim_floor_percent > 100 {
            return Err(VmError::InvalidConfig("percentages must be at most 100".into()));
        }
        if self.victim_floor_percent > self.min_resident_percent {
            return Err(VmError::InvalidConfig(
                "victim_floor_percent exceeds min_resident_percent".into(),
            ));
        }
        Ok(())
    }

    /// Configuration with no heap or stack added to new processes.
    pub fn without_default_segments(mut self) -> Self {
        self.heap_pages = 0;
        self.stack_pages = 0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SystemConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.physical_pages, 256);
        assert_eq!(config.min_resident_percent, 25);
        assert_eq!(config.victim_floor_percent, 15);
    }

    #[test]
    fn test_parse_overrides() {
        let content =
            "# small machine\nphysical_pages = 16\nswap_size=32   # tiny\n\ntime_slice = 3\n";
        let config = SystemConfig::parse(content).unwrap();
        assert_eq!(config.physical_pages, 16);
        assert_eq!(config.swap_size, 32);
        assert_eq!(config.time_slice, 3);
        assert_eq!(config.max_processes, MAX_PROCESSES);
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        let err = SystemConfig::parse("frames = 3").unwrap_err();
        assert_eq!(err, VmError::InvalidConfig("line 1: unknown key frames".into()));
    }

    #[test]
    fn test_parse_rejects_bad_number() {
        assert!(SystemConfig::parse("swap_size = lots").is_err());
        assert!(SystemConfig::parse("swap_size").is_err());
    }

    #[test]
    fn test_validate_percent_ordering() {
        let config = SystemConfig {
            min_resident_percent: 10,
            victim_floor_percent: 20,
            ..SystemConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_rejects_values_that_do_not_fit() {
        let err = SystemConfig::parse("time_slice = 4294967297").unwrap_err();
        let expected = "line 1: time_slice out of range: 4294967297";
        assert_eq!(err, VmError::InvalidConfig(expected.into()));
        assert!(SystemConfig::parse("heap_pages = 4294967296").is_err());
    }

    #[test]
    fn test_validate_bounds_page_counts() {
        let err = SystemConfig::parse("physical_pages = 18446744073709551615").unwrap_err();
        let expected = format!("physical_pages must be at most {}", MAX_PAGE_COUNT);
        assert_eq!(err, VmError::InvalidConfig(expected));

        let defaults = SystemConfig::default();
        let config = SystemConfig { swap_size: MAX_PAGE_COUNT + 1, ..defaults.clone() };
        assert!(config.validate().is_err());
        let config = SystemConfig { max_process_pages: MAX_PAGE_COUNT + 1, ..defaults.clone() };
        assert!(config.validate().is_err());
        let config = SystemConfig { max_process_pages: MAX_PAGE_COUNT, ..defaults };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_time_slice() {
        let config = SystemConfig { time_slice: 0, ..SystemConfig::default() };
        assert!(config.validate().is_err());
    }
}
