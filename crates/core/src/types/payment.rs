//! Payment method and gateway enums.

use serde::{Deserialize, Serialize};

/// How the buyer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    /// Cash on delivery. The order completes without a gateway redirect.
    #[default]
    Cod,
    /// VNPAY hosted payment page.
    Vnpay,
    /// MoMo e-wallet hosted payment page.
    Momo,
}

impl PaymentMethod {
    /// The external gateway this method redirects to, if any.
    #[must_use]
    pub const fn gateway(self) -> Option<PaymentGateway> {
        match self {
            Self::Cod => None,
            Self::Vnpay => Some(PaymentGateway::Vnpay),
            Self::Momo => Some(PaymentGateway::Momo),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cod => write!(f, "COD"),
            Self::Vnpay => write!(f, "VNPAY"),
            Self::Momo => write!(f, "MOMO"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cod" => Ok(Self::Cod),
            "vnpay" => Ok(Self::Vnpay),
            "momo" => Ok(Self::Momo),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}

/// An external payment gateway reached through a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentGateway {
    Vnpay,
    Momo,
}

impl PaymentGateway {
    /// Path segment used by the payment service (`payment/{segment}/create/{id}`).
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Vnpay => "vnpay",
            Self::Momo => "momo",
        }
    }
}

impl std::fmt::Display for PaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vnpay => write!(f, "VNPAY"),
            Self::Momo => write!(f, "MoMo"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("COD".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cod);
        assert_eq!("vnpay".parse::<PaymentMethod>().unwrap(), PaymentMethod::Vnpay);
        assert_eq!(" Momo ".parse::<PaymentMethod>().unwrap(), PaymentMethod::Momo);
        assert!("paypal".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_payment_method_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::Vnpay).unwrap(),
            "\"VNPAY\""
        );
    }

    #[test]
    fn test_gateway_mapping() {
        assert_eq!(PaymentMethod::Cod.gateway(), None);
        assert_eq!(
            PaymentMethod::Momo.gateway().map(PaymentGateway::path_segment),
            Some("momo")
        );
    }
}
