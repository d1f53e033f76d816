//! Projection of engine state onto item controls.
//!
//! Controls are keyed by item id (`btn-sword`, `inv-gold`, ...). The projection reads a
//! snapshot only and never talks to a collaborator.

use crate::{
    EngineSnapshot,
    types::{
        DiscreteItem,
        FungibleKind,
        ItemKind,
        SessionState,
    },
};
use itertools::Itertools;
use std::fmt;

/// Readout text while the connected account's balance has not been read yet.
pub const PENDING_READOUT: &str = "...";

/// Element id of the control bound to `kind`.
pub fn control_id(kind: ItemKind) -> String {
    match kind {
        ItemKind::Discrete(item) => format!("btn-{item}"),
        ItemKind::Fungible(kind) => format!("inv-{kind}"),
    }
}

/// The item bound to element `id`, if `id` names a control.
pub fn parse_control_id(id: &str) -> Option<ItemKind> {
    let kind = id
        .strip_prefix("btn-")
        .or_else(|| id.strip_prefix("inv-"))?
        .parse::<ItemKind>()
        .ok()?;
    (control_id(kind) == id).then_some(kind)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemControl {
    pub control_id: String,
    pub item: DiscreteItem,
    pub enabled: bool,
    pub label: String,
}

impl ItemControl {
    fn project(item: DiscreteItem, owned: bool) -> Self {
        let label = if owned {
            format!("✅ {item} minted")
        } else {
            format!("Pick up {item}")
        };
        Self {
            control_id: control_id(ItemKind::Discrete(item)),
            item,
            enabled: !owned,
            label,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FungibleReadout {
    pub control_id: String,
    pub kind: FungibleKind,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlPanel {
    pub wallet_status: String,
    pub items: Vec<ItemControl>,
    pub readouts: Vec<FungibleReadout>,
}

impl ControlPanel {
    pub fn item(&self, item: DiscreteItem) -> Option<&ItemControl> {
        self.items.iter().find(|control| control.item == item)
    }

    pub fn readout(&self, kind: FungibleKind) -> Option<&FungibleReadout> {
        self.readouts.iter().find(|readout| readout.kind == kind)
    }
}

impl fmt::Display for ControlPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.wallet_status)?;
        let items = self
            .items
            .iter()
            .map(|control| {
                let state = if control.enabled { "enabled" } else { "disabled" };
                format!("  [{}] {} ({state})", control.control_id, control.label)
            })
            .join("\n");
        writeln!(f, "{items}")?;
        let readouts = self
            .readouts
            .iter()
            .map(|readout| format!("  [{}] {}: {}", readout.control_id, readout.kind, readout.text))
            .join("\n");
        write!(f, "{readouts}")
    }
}

/// Project `snapshot` onto the controls. Fungible amounts are rendered at `decimals`.
pub fn project(snapshot: &EngineSnapshot, decimals: u8) -> ControlPanel {
    let wallet_status = match &snapshot.session {
        SessionState::Connected(identity) => format!("Connected: {identity}"),
        SessionState::Connecting | SessionState::Disconnected => "Not connected".to_string(),
    };
    let inventory = match snapshot.session.identity() {
        Some(identity) if snapshot.inventory.owner.as_ref() == Some(identity) => {
            Some(&snapshot.inventory)
        }
        _ => None,
    };
    let items = DiscreteItem::ALL
        .into_iter()
        .map(|item| ItemControl::project(item, inventory.is_some_and(|inv| inv.owns(item))))
        .collect();
    let gold = FungibleKind::Gold;
    let text = match inventory.and_then(|inv| inv.balance(gold)) {
        Some(amount) => amount.to_human(decimals),
        None if snapshot.session.identity().is_some() => PENDING_READOUT.to_string(),
        None => "0".to_string(),
    };
    let readouts = vec![FungibleReadout {
        control_id: control_id(ItemKind::Fungible(gold)),
        kind: gold,
        text,
    }];
    ControlPanel {
        wallet_status,
        items,
        readouts,
    }
}

/// Repaints only when the engine's display revision moved past the last one painted.
#[derive(Debug)]
pub struct ControlBinder {
    decimals: u8,
    revision: Option<u64>,
    panel: ControlPanel,
}

impl ControlBinder {
    pub fn new(decimals: u8) -> Self {
        Self {
            decimals,
            revision: None,
            panel: project(&EngineSnapshot::default(), decimals),
        }
    }

    /// Returns whether the panel changed revision.
    pub fn repaint(&mut self, snapshot: &EngineSnapshot) -> bool {
        if self.revision.is_some_and(|painted| painted >= snapshot.revision) {
            return false;
        }
        self.panel = project(snapshot, self.decimals);
        self.revision = Some(snapshot.revision);
        true
    }

    pub fn panel(&self) -> &ControlPanel {
        &self.panel
    }
}
