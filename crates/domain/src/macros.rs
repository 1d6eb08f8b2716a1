//! Macro for implementing Display and FromStr for string-keyed enums
//!
//! Used for enums that are read from environment variables or config files
//! (call priorities, log formats). Parsing is case-insensitive and display is
//! always lowercase.
//!
//! # Example
//!
//! ```rust
//! use pawlink_domain::impl_string_enum_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum LogFormat {
//!     Pretty,
//!     Json,
//! }
//!
//! impl_string_enum_conversions!(LogFormat {
//!     Pretty => "pretty",
//!     Json => "json",
//! });
//!
//! assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
//! ```

/// Implements Display and FromStr traits for string-keyed enums
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their lowercase string
///   representations
#[macro_export]
macro_rules! impl_string_enum_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
