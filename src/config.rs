/// Construction-time knobs for an [`crate::Index`]: key/value sizes
/// and the initial capacity hint. Separated from `Index::init` so the
/// validation in `validate` has one place to live and one place to
/// test.
use crate::error::{IndexError, Result};
use crate::layout::{MAX_FIELD_SIZE, MIN_KEY_SIZE, MIN_VALUE_SIZE};

#[derive(Debug, Clone, Copy)]
pub struct IndexConfig {
    pub key_size: u8,
    pub value_size: u8,
    pub capacity: u32,
}

impl IndexConfig {
    pub fn new(capacity: u32, key_size: u8, value_size: u8) -> Self {
        IndexConfig {
            key_size,
            value_size,
            capacity,
        }
    }

    /// Reject key/value sizes that would corrupt the sentinel scheme
    /// or can't be represented in the single-byte header fields.
    pub fn validate(&self) -> Result<()> {
        if self.key_size < MIN_KEY_SIZE || self.key_size > MAX_FIELD_SIZE {
            return Err(IndexError::InvalidArgument {
                reason: format!(
                    "key_size must be in [{MIN_KEY_SIZE}, {MAX_FIELD_SIZE}], got {}",
                    self.key_size
                ),
            });
        }
        if self.value_size < MIN_VALUE_SIZE || self.value_size > MAX_FIELD_SIZE {
            return Err(IndexError::InvalidArgument {
                reason: format!(
                    "value_size must be in [{MIN_VALUE_SIZE}, {MAX_FIELD_SIZE}], got {}",
                    self.value_size
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_key() {
        let cfg = IndexConfig::new(0, 3, 12);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_short_value() {
        let cfg = IndexConfig::new(0, 32, 3);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_oversize_fields() {
        let cfg = IndexConfig::new(0, 128, 12);
        assert!(cfg.validate().is_err());
        let cfg = IndexConfig::new(0, 32, 128);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_valid_sizes() {
        let cfg = IndexConfig::new(0, 32, 12);
        assert!(cfg.validate().is_ok());
    }
}
