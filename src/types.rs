use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    str::FromStr,
};

/// Account handle of the controlling user.
///
/// Handles are trimmed and lower-cased on construction so that two spellings of the same
/// address compare equal everywhere in the engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownItem(pub String);

impl fmt::Display for UnknownItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown item kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownItem {}

/// Non-fungible items. Each account may claim each kind at most once.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DiscreteItem {
    Sword,
    Potion,
    Gem,
}

impl DiscreteItem {
    pub const ALL: [DiscreteItem; 3] =
        [DiscreteItem::Sword, DiscreteItem::Potion, DiscreteItem::Gem];

    pub fn as_str(self) -> &'static str {
        match self {
            DiscreteItem::Sword => "sword",
            DiscreteItem::Potion => "potion",
            DiscreteItem::Gem => "gem",
        }
    }
}

impl fmt::Display for DiscreteItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscreteItem {
    type Err = UnknownItem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sword" => Ok(DiscreteItem::Sword),
            "potion" => Ok(DiscreteItem::Potion),
            "gem" => Ok(DiscreteItem::Gem),
            _ => Err(UnknownItem(s.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FungibleKind {
    Gold,
}

impl FungibleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FungibleKind::Gold => "gold",
        }
    }
}

impl fmt::Display for FungibleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FungibleKind {
    type Err = UnknownItem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gold" => Ok(FungibleKind::Gold),
            _ => Err(UnknownItem(s.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Discrete(DiscreteItem),
    Fungible(FungibleKind),
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Discrete(item) => item.fmt(f),
            ItemKind::Fungible(kind) => kind.fmt(f),
        }
    }
}

impl FromStr for ItemKind {
    type Err = UnknownItem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<DiscreteItem>()
            .map(ItemKind::Discrete)
            .or_else(|_| s.parse::<FungibleKind>().map(ItemKind::Fungible))
    }
}

/// Fungible quantity in the token's smallest unit.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenAmount(pub u128);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidAmount(pub String);

impl fmt::Display for InvalidAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid token amount '{}'", self.0)
    }
}

impl std::error::Error for InvalidAmount {}

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    /// Parses a human decimal such as `"12.5"` at the given scale.
    pub fn from_human(raw: &str, decimals: u8) -> Result<Self, InvalidAmount> {
        let invalid = || InvalidAmount(raw.to_string());
        let trimmed = raw.trim();
        let (whole, frac) = match trimmed.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (trimmed, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > usize::from(decimals)
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let scale = 10u128.checked_pow(u32::from(decimals)).ok_or_else(invalid)?;
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let padded = format!("{frac:0<width$}", width = usize::from(decimals));
        let frac: u128 = if padded.is_empty() {
            0
        } else {
            padded.parse().map_err(|_| invalid())?
        };
        whole
            .checked_mul(scale)
            .and_then(|w| w.checked_add(frac))
            .map(TokenAmount)
            .ok_or_else(invalid)
    }

    /// Renders the amount at the given scale with trailing zeros trimmed.
    pub fn to_human(self, decimals: u8) -> String {
        let Some(scale) = 10u128.checked_pow(u32::from(decimals)) else {
            return self.0.to_string();
        };
        let whole = self.0 / scale;
        let frac = self.0 % scale;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{frac:0>width$}", width = usize::from(decimals));
        format!("{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One owned discrete item together with the content reference embedded in its claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item: DiscreteItem,
    pub metadata_ref: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected(Identity),
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Connected(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MintPhase {
    Provisioning,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

impl MintPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, MintPhase::Confirmed | MintPhase::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintRequest {
    pub item: DiscreteItem,
    pub requester: Identity,
    pub phase: MintPhase,
    pub started_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustDirection {
    Mint,
    Burn,
}

impl fmt::Display for AdjustDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdjustDirection::Mint => f.write_str("mint"),
            AdjustDirection::Burn => f.write_str("burn"),
        }
    }
}

/// Opaque reference to a submitted ledger transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(pub String);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof that a transaction reached finality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finality {
    pub tx: TxHandle,
    pub block_height: u64,
}
