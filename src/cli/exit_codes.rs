//! CLI Exit Codes
//!
//! Stable exit codes for scripts driving `d3net-cli`.

use crate::config::ConfigError;
use crate::core::bridge::BridgeError;
use crate::core::gateway::{CommandError, GatewayError};
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Port could not be opened
    pub const CONNECTION_FAILED: u8 = 3;

    /// Gateway did not answer in time
    pub const TIMEOUT: u8 = 4;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Malformed or corrupted response
    pub const PROTOCOL_ERROR: u8 = 9;

    /// Unit slot is empty
    pub const UNIT_NOT_FOUND: u8 = 12;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;

    /// Interrupted by Ctrl+C
    pub const INTERRUPTED: u8 = 130;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success carrying a message for stdout
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Bad command-line input
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::INVALID_ARGS, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn transport_code(err: &TransportError) -> u8 {
    match err {
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        TransportError::ConnectionFailed(_) | TransportError::IoError(_) => {
            ExitCodes::CONNECTION_FAILED
        }
        TransportError::Timeout { .. } => ExitCodes::TIMEOUT,
        TransportError::Framing(_) | TransportError::CrcMismatch { .. } => {
            ExitCodes::PROTOCOL_ERROR
        }
        TransportError::InvalidArgument(_) | TransportError::InvalidSize(_) => {
            ExitCodes::INVALID_ARGS
        }
    }
}

fn gateway_code(err: &GatewayError) -> u8 {
    match err {
        GatewayError::Bus(e) => transport_code(e),
        GatewayError::InvalidUnit(_) => ExitCodes::INVALID_ARGS,
        GatewayError::UnitNotPresent(_) => ExitCodes::UNIT_NOT_FOUND,
    }
}

impl From<TransportError> for CliResult {
    fn from(err: TransportError) -> Self {
        Self::Error(transport_code(&err), err.to_string())
    }
}

impl From<GatewayError> for CliResult {
    fn from(err: GatewayError) -> Self {
        Self::Error(gateway_code(&err), err.to_string())
    }
}

impl From<CommandError> for CliResult {
    fn from(err: CommandError) -> Self {
        Self::Error(ExitCodes::INVALID_ARGS, err.to_string())
    }
}

impl From<BridgeError> for CliResult {
    fn from(err: BridgeError) -> Self {
        let code = match &err {
            BridgeError::Busy(_) => ExitCodes::ERROR,
            BridgeError::Gateway(e) => gateway_code(e),
            BridgeError::Command(_) => ExitCodes::INVALID_ARGS,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

/// Map an error chain to a result, using the first typed error found
pub fn from_anyhow(err: &anyhow::Error) -> CliResult {
    for cause in err.chain() {
        let code = if let Some(e) = cause.downcast_ref::<TransportError>() {
            transport_code(e)
        } else if let Some(e) = cause.downcast_ref::<GatewayError>() {
            gateway_code(e)
        } else if let Some(e) = cause.downcast_ref::<BridgeError>() {
            match e {
                BridgeError::Busy(_) => ExitCodes::ERROR,
                BridgeError::Gateway(g) => gateway_code(g),
                BridgeError::Command(_) => ExitCodes::INVALID_ARGS,
            }
        } else if cause.is::<CommandError>() {
            ExitCodes::INVALID_ARGS
        } else if cause.is::<ConfigError>() {
            ExitCodes::CONFIG_ERROR
        } else {
            continue;
        };
        return CliResult::Error(code, format!("{err:#}"));
    }
    CliResult::Error(ExitCodes::ERROR, format!("{err:#}"))
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error or gateway busy",
        2 => "Invalid arguments or command",
        3 => "Connection failed",
        4 => "Gateway timeout",
        7 => "Permission denied",
        8 => "Configuration error",
        9 => "Protocol error (framing or CRC)",
        12 => "Unit not present",
        14 => "Port not found",
        130 => "Interrupted",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 7, 8, 9, 12, 14, 130] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::error(3, "Connection failed");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Connection failed"));
    }

    #[test]
    fn test_transport_codes() {
        let cases = [
            (TransportError::PortNotFound("COM9".into()), ExitCodes::PORT_NOT_FOUND),
            (TransportError::PermissionDenied("/dev/ttyS0".into()), ExitCodes::PERMISSION_DENIED),
            (TransportError::Timeout { expected: 23, received: 0 }, ExitCodes::TIMEOUT),
            (TransportError::Framing("function code"), ExitCodes::PROTOCOL_ERROR),
            (
                TransportError::CrcMismatch { calculated: 1, received: 2 },
                ExitCodes::PROTOCOL_ERROR,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(CliResult::from(err).code(), code);
        }
    }

    #[test]
    fn test_gateway_and_bridge_codes() {
        assert_eq!(CliResult::from(GatewayError::UnitNotPresent(4)).code(), ExitCodes::UNIT_NOT_FOUND);
        assert_eq!(CliResult::from(GatewayError::InvalidUnit(64)).code(), ExitCodes::INVALID_ARGS);
        assert_eq!(CliResult::from(BridgeError::Busy("command")).code(), ExitCodes::ERROR);
        assert_eq!(
            CliResult::from(BridgeError::Command(CommandError::UnknownCommand("swing".into()))).code(),
            ExitCodes::INVALID_ARGS
        );
    }

    #[test]
    fn test_from_anyhow_finds_typed_cause() {
        let err = anyhow::Error::new(GatewayError::Bus(TransportError::Timeout {
            expected: 23,
            received: 4,
        }))
        .context("status read");
        let result = from_anyhow(&err);
        assert_eq!(result.code(), ExitCodes::TIMEOUT);
        assert!(result.message().is_some_and(|m| m.starts_with("status read")));

        assert_eq!(from_anyhow(&anyhow::anyhow!("plain")).code(), ExitCodes::ERROR);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(exit_code_description(12), "Unit not present");
        assert_eq!(exit_code_description(200), "Unknown error");
    }
}
