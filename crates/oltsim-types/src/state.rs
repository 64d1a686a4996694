//! Device state and mode enumerations.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Link-level operational state of an OLT, NNI or PON port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperState {
    Up,
    #[default]
    Down,
}

impl OperState {
    /// Returns true if the state is up.
    pub const fn is_up(&self) -> bool {
        matches!(self, OperState::Up)
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperState::Up => write!(f, "up"),
            OperState::Down => write!(f, "down"),
        }
    }
}

impl FromStr for OperState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(OperState::Up),
            "down" => Ok(OperState::Down),
            _ => Err(ParseError::InvalidOperState(s.to_string())),
        }
    }
}

impl From<bool> for OperState {
    fn from(up: bool) -> Self {
        if up {
            OperState::Up
        } else {
            OperState::Down
        }
    }
}

/// Administrative state reported in ONU indications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    Up,
    #[default]
    Down,
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminState::Up => write!(f, "up"),
            AdminState::Down => write!(f, "down"),
        }
    }
}

impl From<OperState> for AdminState {
    fn from(state: OperState) -> Self {
        match state {
            OperState::Up => AdminState::Up,
            OperState::Down => AdminState::Down,
        }
    }
}

/// Optical technology of a PON port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PonTechnology {
    #[default]
    #[serde(rename = "GPON")]
    Gpon,
    #[serde(rename = "XGS-PON")]
    XgsPon,
}

impl fmt::Display for PonTechnology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PonTechnology::Gpon => write!(f, "GPON"),
            PonTechnology::XgsPon => write!(f, "XGS-PON"),
        }
    }
}

impl FromStr for PonTechnology {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GPON" => Ok(PonTechnology::Gpon),
            "XGS-PON" | "XGSPON" => Ok(PonTechnology::XgsPon),
            _ => Err(ParseError::InvalidTechnology(s.to_string())),
        }
    }
}

/// Which parts of the bring-up sequence the simulator performs on its own.
///
/// | mode       | PONs on enable | ONU discovery |
/// |------------|----------------|---------------|
/// | `default`  | automatic      | automatic     |
/// | `only-onu` | automatic      | manual        |
/// | `only-pon` | manual         | automatic     |
/// | `both`     | manual         | manual        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlledActivation {
    #[default]
    Default,
    OnlyOnu,
    OnlyPon,
    Both,
}

impl ControlledActivation {
    /// Returns true if PON ports come up without an explicit enable call.
    pub const fn auto_enables_pons(&self) -> bool {
        matches!(self, ControlledActivation::Default | ControlledActivation::OnlyOnu)
    }

    /// Returns true if ONUs are discovered as soon as their PON comes up.
    pub const fn auto_discovers_onus(&self) -> bool {
        matches!(self, ControlledActivation::Default | ControlledActivation::OnlyPon)
    }
}

impl fmt::Display for ControlledActivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControlledActivation::Default => "default",
            ControlledActivation::OnlyOnu => "only-onu",
            ControlledActivation::OnlyPon => "only-pon",
            ControlledActivation::Both => "both",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ControlledActivation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(ControlledActivation::Default),
            "only-onu" => Ok(ControlledActivation::OnlyOnu),
            "only-pon" => Ok(ControlledActivation::OnlyPon),
            "both" => Ok(ControlledActivation::Both),
            _ => Err(ParseError::InvalidActivationMode(s.to_string())),
        }
    }
}

/// Interface classes addressable by alarms and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Nni,
    Pon,
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceType::Nni => write!(f, "nni"),
            InterfaceType::Pon => write!(f, "pon"),
        }
    }
}

impl FromStr for InterfaceType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nni" | "ethernet_nni" => Ok(InterfaceType::Nni),
            "pon" => Ok(InterfaceType::Pon),
            _ => Err(ParseError::InvalidInterfaceType(s.to_string())),
        }
    }
}

/// Raised/cleared status of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmStatus {
    On,
    Off,
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmStatus::On => write!(f, "on"),
            AlarmStatus::Off => write!(f, "off"),
        }
    }
}

impl FromStr for AlarmStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" => Ok(AlarmStatus::On),
            "off" => Ok(AlarmStatus::Off),
            _ => Err(ParseError::InvalidAlarmStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_oper_state_display_and_parse() {
        assert_eq!(OperState::Up.to_string(), "up");
        assert_eq!("DOWN".parse::<OperState>().unwrap(), OperState::Down);
        assert!("sideways".parse::<OperState>().is_err());
        assert_eq!(OperState::from(true), OperState::Up);
        assert_eq!(OperState::default(), OperState::Down);
    }

    #[test]
    fn test_technology_parse() {
        assert_eq!("gpon".parse::<PonTechnology>().unwrap(), PonTechnology::Gpon);
        assert_eq!("XGS-PON".parse::<PonTechnology>().unwrap(), PonTechnology::XgsPon);
        assert_eq!(PonTechnology::XgsPon.to_string(), "XGS-PON");
        assert!("epon".parse::<PonTechnology>().is_err());
    }

    #[test]
    fn test_activation_modes() {
        let mode: ControlledActivation = "only-onu".parse().unwrap();
        assert!(mode.auto_enables_pons());
        assert!(!mode.auto_discovers_onus());

        let mode: ControlledActivation = "only-pon".parse().unwrap();
        assert!(!mode.auto_enables_pons());
        assert!(mode.auto_discovers_onus());

        assert!(!ControlledActivation::Both.auto_enables_pons());
        assert!(!ControlledActivation::Both.auto_discovers_onus());
        assert_eq!(ControlledActivation::OnlyPon.to_string(), "only-pon");
    }

    #[test]
    fn test_interface_type_parse() {
        assert_eq!("ethernet_nni".parse::<InterfaceType>().unwrap(), InterfaceType::Nni);
        assert_eq!("PON".parse::<InterfaceType>().unwrap(), InterfaceType::Pon);
        assert_eq!(
            "uni".parse::<InterfaceType>(),
            Err(ParseError::InvalidInterfaceType("uni".to_string()))
        );
    }

    #[test]
    fn test_alarm_status_parse() {
        assert_eq!("on".parse::<AlarmStatus>().unwrap(), AlarmStatus::On);
        assert!("maybe".parse::<AlarmStatus>().is_err());
    }
}
