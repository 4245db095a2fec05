/// Engine configuration for WAL sizing and flush behavior.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Size of each WAL's in-memory ring buffer, in bytes.
    pub wal_buffer_size: usize,

    /// Fraction of the buffer that, once crossed by `write_offset`, fires a
    /// threshold background flush.
    pub flush_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wal_buffer_size: 10 * 1024 * 1024, // 10 MiB, per the WAL state spec
            flush_threshold: 0.75,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wal_buffer_size(mut self, size: usize) -> Self {
        self.wal_buffer_size = size;
        self
    }

    pub fn with_flush_threshold(mut self, threshold: f64) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.wal_buffer_size == 0 {
            return Err("wal_buffer_size must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.flush_threshold) {
            return Err("flush_threshold must be in [0.0, 1.0]".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.wal_buffer_size, 10 * 1024 * 1024);
        assert_eq!(config.flush_threshold, 0.75);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = EngineConfig::new().with_wal_buffer_size(4096).with_flush_threshold(0.5);
        assert_eq!(config.wal_buffer_size, 4096);
        assert_eq!(config.flush_threshold, 0.5);
    }

    #[test]
    fn validate_rejects_zero_buffer() {
        let config = EngineConfig::new().with_wal_buffer_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let config = EngineConfig::new().with_flush_threshold(1.5);
        assert!(config.validate().is_err());
    }
}
