//! Normative resource caps and container launch parameters. Values match
//! the reference service's defaults; callers can override per-execution
//! limits via [`ResourceLimits`] when a request needs to.

#[derive(Debug, Clone)]
pub struct ResourceLimits {
    pub memory_mb: u64,
    pub cpu_cores: f64,
    pub tmpfs_mb: u64,
    pub timeout_secs: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self { memory_mb: 2048, cpu_cores: 2.0, tmpfs_mb: 512, timeout_secs: 300 }
    }
}

impl ResourceLimits {
    pub fn memory_bytes(&self) -> i64 {
        (self.memory_mb * 1024 * 1024) as i64
    }

    /// `cpu_quota` given a fixed 100ms `cpu_period`, matching the reference
    /// service's `cpu_period=100000, cpu_quota=200000` pair for 2 cores.
    pub fn cpu_quota(&self) -> i64 {
        (self.cpu_cores * 100_000.0) as i64
    }

    pub const fn cpu_period() -> i64 {
        100_000
    }

    pub fn tmpfs_size_bytes(&self) -> u64 {
        self.tmpfs_mb * 1024 * 1024
    }

    /// Grace period allowed for a cooperative stop before forced removal.
    pub const fn stop_grace_secs() -> i64 {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_cores_is_200000_quota_over_100000_period() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.cpu_quota(), 200_000);
        assert_eq!(ResourceLimits::cpu_period(), 100_000);
    }

    #[test]
    fn default_memory_is_two_gib() {
        assert_eq!(ResourceLimits::default().memory_bytes(), 2 * 1024 * 1024 * 1024);
    }
}
