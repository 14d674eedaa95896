//! Declarative validation rules for configuration structs.
//!
//! ```rust,ignore
//! impl_config_validator!(ColorThresholdConfig {
//!     kernel_size: min(1),
//!     min_area: min(1),
//! });
//! ```

/// Implements [`ConfigValidator`](crate::core::config::ConfigValidator) for a
/// type from a list of per-field rules.
#[macro_export]
macro_rules! impl_config_validator {
    ($type_name:ident { $($field:ident: $validator:ident $(($($args:tt)*))?),* $(,)? }) => {
        impl $crate::core::config::ConfigValidator for $type_name {
            fn validate(&self) -> Result<(), $crate::core::config::ConfigError> {
                $(
                    $crate::validate_field!(self, $field, $validator $(($($args)*))?);
                )*
                Ok(())
            }

            fn get_defaults() -> Self
            where
                Self: Sized,
            {
                Self::default()
            }
        }
    };
}

/// Helper macro for field validation.
#[macro_export]
macro_rules! validate_field {
    ($self:expr, $field:ident, range($min:expr, $max:expr)) => {
        if !($min..=$max).contains(&$self.$field) {
            return Err($crate::core::config::ConfigError::InvalidConfig {
                message: format!(
                    "{} must be between {} and {}",
                    stringify!($field),
                    $min,
                    $max
                ),
            });
        }
    };

    ($self:expr, $field:ident, min($min_val:expr)) => {
        if $self.$field < $min_val {
            return Err($crate::core::config::ConfigError::InvalidConfig {
                message: format!("{} must be at least {}", stringify!($field), $min_val),
            });
        }
    };

    ($self:expr, $field:ident, max($max_val:expr)) => {
        if $self.$field > $max_val {
            return Err($crate::core::config::ConfigError::InvalidConfig {
                message: format!("{} must be at most {}", stringify!($field), $max_val),
            });
        }
    };

    ($self:expr, $field:ident, ordered_pair) => {
        if $self.$field.0 > $self.$field.1 {
            return Err($crate::core::config::ConfigError::InvalidConfig {
                message: format!(
                    "{} lower bound {} exceeds upper bound {}",
                    stringify!($field),
                    $self.$field.0,
                    $self.$field.1
                ),
            });
        }
    };
}
