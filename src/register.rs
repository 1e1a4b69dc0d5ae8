//! Register group model and the per-tick scan plan.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The four Modbus register spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    /// Writable single-bit output points.
    Coil,
    /// Read-only single-bit input points.
    DiscreteInput,
    /// Read/write 16-bit words.
    HoldingRegister,
    /// Read-only 16-bit words.
    InputRegister,
}

impl RegisterKind {
    /// All kinds in scan order: coils, discrete inputs, holding registers,
    /// input registers.
    pub const ALL: [RegisterKind; 4] = [
        RegisterKind::Coil,
        RegisterKind::DiscreteInput,
        RegisterKind::HoldingRegister,
        RegisterKind::InputRegister,
    ];

    /// Field key used for this kind in serialized records.
    pub fn wire_name(&self) -> &'static str {
        match self {
            RegisterKind::Coil => "coils",
            RegisterKind::DiscreteInput => "discrete_inputs",
            RegisterKind::HoldingRegister => "holding_registers",
            RegisterKind::InputRegister => "input_registers",
        }
    }

    /// Look up a kind from its record field key.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "coils" => Some(RegisterKind::Coil),
            "discrete_inputs" => Some(RegisterKind::DiscreteInput),
            "holding_registers" => Some(RegisterKind::HoldingRegister),
            "input_registers" => Some(RegisterKind::InputRegister),
            _ => None,
        }
    }

    /// Bit-addressed kinds read single bits instead of 16-bit words.
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterKind::Coil | RegisterKind::DiscreteInput)
    }

    /// The write operation this kind accepts, if any. Discrete inputs and
    /// input registers are read-only.
    pub fn write_target(&self) -> Option<WriteTarget> {
        match self {
            RegisterKind::Coil => Some(WriteTarget::Coil),
            RegisterKind::HoldingRegister => Some(WriteTarget::HoldingRegister),
            RegisterKind::DiscreteInput | RegisterKind::InputRegister => None,
        }
    }
}

impl std::fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// The two register spaces that accept writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    /// Single-bit write via the write-coil function.
    Coil,
    /// 16-bit write via the write-register function.
    HoldingRegister,
}

impl std::fmt::Display for WriteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteTarget::Coil => write!(f, "coil"),
            WriteTarget::HoldingRegister => write!(f, "holding register"),
        }
    }
}

/// One contiguous span of points to poll within a register space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterGroup {
    pub kind: RegisterKind,
    pub base_address: u16,
    /// Number of points to read; zero disables the group.
    pub point_count: u16,
}

/// The polling plan: at most one group per register kind, scanned in the
/// fixed order of [`RegisterKind::ALL`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPlan {
    groups: Vec<RegisterGroup>,
}

impl ScanPlan {
    /// Build a plan from explicit groups. Groups with a zero point count are
    /// dropped; duplicate kinds are rejected.
    pub fn new(groups: impl IntoIterator<Item = RegisterGroup>) -> Result<Self> {
        let mut by_kind: [Option<RegisterGroup>; 4] = [None; 4];

        for group in groups {
            if group.point_count == 0 {
                continue;
            }
            let slot = &mut by_kind[group.kind as usize];
            if slot.is_some() {
                return Err(Error::Config(format!(
                    "duplicate scan group for '{}'",
                    group.kind
                )));
            }
            *slot = Some(group);
        }

        Ok(Self {
            groups: by_kind.into_iter().flatten().collect(),
        })
    }

    /// Enabled groups in scan order.
    pub fn groups(&self) -> impl Iterator<Item = &RegisterGroup> {
        self.groups.iter()
    }

    /// Number of enabled groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True when every group is disabled.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(RegisterKind::Coil.wire_name(), "coils");
        assert_eq!(RegisterKind::DiscreteInput.wire_name(), "discrete_inputs");
        assert_eq!(
            RegisterKind::HoldingRegister.wire_name(),
            "holding_registers"
        );
        assert_eq!(RegisterKind::InputRegister.wire_name(), "input_registers");

        for kind in RegisterKind::ALL {
            assert_eq!(RegisterKind::from_wire_name(kind.wire_name()), Some(kind));
        }
        assert_eq!(RegisterKind::from_wire_name("registers"), None);
    }

    #[test]
    fn test_write_targets() {
        assert_eq!(RegisterKind::Coil.write_target(), Some(WriteTarget::Coil));
        assert_eq!(
            RegisterKind::HoldingRegister.write_target(),
            Some(WriteTarget::HoldingRegister)
        );
        assert_eq!(RegisterKind::DiscreteInput.write_target(), None);
        assert_eq!(RegisterKind::InputRegister.write_target(), None);
    }

    #[test]
    fn test_scan_plan_keeps_fixed_order() {
        let plan = ScanPlan::new([
            RegisterGroup {
                kind: RegisterKind::InputRegister,
                base_address: 30,
                point_count: 4,
            },
            RegisterGroup {
                kind: RegisterKind::Coil,
                base_address: 0,
                point_count: 8,
            },
        ])
        .unwrap();

        let kinds: Vec<_> = plan.groups().map(|g| g.kind).collect();
        assert_eq!(kinds, [RegisterKind::Coil, RegisterKind::InputRegister]);
    }

    #[test]
    fn test_scan_plan_drops_disabled_groups() {
        let plan = ScanPlan::new([
            RegisterGroup {
                kind: RegisterKind::Coil,
                base_address: 0,
                point_count: 0,
            },
            RegisterGroup {
                kind: RegisterKind::HoldingRegister,
                base_address: 100,
                point_count: 2,
            },
        ])
        .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.groups().next().unwrap().kind,
            RegisterKind::HoldingRegister
        );
    }

    #[test]
    fn test_scan_plan_rejects_duplicate_kinds() {
        let result = ScanPlan::new([
            RegisterGroup {
                kind: RegisterKind::Coil,
                base_address: 0,
                point_count: 4,
            },
            RegisterGroup {
                kind: RegisterKind::Coil,
                base_address: 16,
                point_count: 4,
            },
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_empty_plan() {
        let plan = ScanPlan::new([]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
    }
}
