//! Small reference networks used by the binary and the tests.

use anyhow::{format_err, Result};

use crate::*;

/// Names accepted by [`by_name`].
pub const CASE_NAMES: [&str; 3] = ["case2", "case3", "case4"];

/// Builds the named case with `nt` periods.
pub fn by_name(name: &str, nt: usize) -> Result<Network> {
    match name {
        "case2" => Ok(two_bus_periods(nt)),
        "case3" => Ok(three_bus(nt)),
        "case4" => Ok(four_bus(nt)),
        _ => Err(format_err!(
            "unknown case {} (expected one of {})",
            name,
            CASE_NAMES.join(", ")
        )),
    }
}

fn network(nt: usize) -> Network {
    Network::new(NetOpt {
        num_periods: nt,
        ..NetOpt::default()
    })
}

/// Slack bus feeding a 0.5 p.u. load over a lossless line (x = 0.1).
pub fn two_bus() -> Network {
    two_bus_periods(1)
}

fn two_bus_periods(nt: usize) -> Network {
    let mut net = network(nt);
    let slack = net.add_bus(Bus {
        slack: true,
        ..Bus::new(1)
    });
    let pq = net.add_bus(Bus::new(2));

    let gen = Gen {
        reg_bus: Some(slack),
        p_max: 2.0,
        p_min: 0.0,
        q_max: 1.0,
        q_min: -1.0,
        ..Gen::new(slack)
    };
    // indices are valid by construction
    let _ = net.add_gen(gen);
    let _ = net.add_load(Load::new(pq, 0.5, 0.0));
    let _ = net.add_branch(Branch::new(slack, pq, 0.0, 0.1));
    net
}

/// Meshed network with a slack bus, one PV bus and a load bus with a
/// fixed shunt.
pub fn three_bus(nt: usize) -> Network {
    let mut net = network(nt);
    let b1 = net.add_bus(Bus {
        slack: true,
        v_mag: vec![1.02],
        v_set: vec![1.02],
        ..Bus::new(1)
    });
    let b2 = net.add_bus(Bus {
        v_mag: vec![1.01],
        v_set: vec![1.01],
        ..Bus::new(2)
    });
    let b3 = net.add_bus(Bus::new(3));

    let _ = net.add_gen(Gen {
        reg_bus: Some(b1),
        p: vec![0.6],
        p_max: 2.0,
        q_max: 1.5,
        q_min: -1.5,
        cost_coeff_q1: 20.0,
        cost_coeff_q2: 5.0,
        ..Gen::new(b1)
    });
    let _ = net.add_gen(Gen {
        reg_bus: Some(b2),
        p: vec![0.4],
        q: vec![0.1],
        p_max: 1.0,
        p_min: 0.1,
        q_max: 0.3,
        q_min: -0.3,
        ..Gen::new(b2)
    });
    let _ = net.add_load(Load::new(b3, 0.9, 0.3));
    let _ = net.add_shunt(Shunt::new(b3, 0.01, 0.05));

    let _ = net.add_branch(Branch::new(b1, b2, 0.01, 0.1).with_charging(0.02));
    let _ = net.add_branch(Branch::new(b2, b3, 0.02, 0.15).with_charging(0.02));
    let _ = net.add_branch(Branch::new(b1, b3, 0.015, 0.12));
    net
}

/// Network exercising every regulating device: two co-regulating
/// generators, a voltage controlling tap changer, a phase shifter and a
/// switched shunt.
pub fn four_bus(nt: usize) -> Network {
    let mut net = network(nt);
    let b1 = net.add_bus(Bus {
        slack: true,
        v_mag: vec![1.03],
        v_set: vec![1.03],
        ..Bus::new(1)
    });
    let b2 = net.add_bus(Bus {
        v_mag: vec![1.01],
        v_set: vec![1.01],
        ..Bus::new(2)
    });
    let b3 = net.add_bus(Bus {
        v_mag: vec![0.99],
        v_set: vec![1.0],
        ..Bus::new(3)
    });
    let b4 = net.add_bus(Bus {
        v_mag: vec![0.98],
        v_ang: vec![-0.05],
        v_set: vec![1.0],
        ..Bus::new(4)
    });

    let _ = net.add_gen(Gen {
        reg_bus: Some(b1),
        p: vec![0.7],
        p_max: 3.0,
        q_max: 2.0,
        q_min: -2.0,
        ..Gen::new(b1)
    });
    for (q, q_par) in [(0.05, 1.0), (0.15, 2.0)] {
        let _ = net.add_gen(Gen {
            reg_bus: Some(b2),
            p: vec![0.3],
            q: vec![q],
            p_max: 0.8,
            p_min: 0.1,
            q_max: 0.4,
            q_min: -0.2,
            q_par,
            ..Gen::new(b2)
        });
    }
    let _ = net.add_load(Load::new(b3, 0.8, 0.25));
    let _ = net.add_load(Load::new(b4, 0.5, 0.2));
    let _ = net.add_shunt(Shunt::new(b4, 0.0, 0.1).with_regulation(b4, 0.0, 0.3));

    let _ = net.add_branch(Branch::new(b1, b2, 0.01, 0.08).with_charging(0.03));
    let _ = net.add_branch(Branch {
        reg_bus: Some(b3),
        g_k: 0.002,
        ..Branch::new(b2, b3, 0.005, 0.06).with_tap_changer(1.02, 0.9, 1.1)
    });
    let _ = net.add_branch(Branch::new(b1, b4, 0.01, 0.1).with_phase_shifter(0.03, -0.2, 0.2));
    let _ = net.add_branch(Branch::new(b3, b4, 0.02, 0.12).with_charging(0.02));
    net
}

/// Flags the variables of a power flow: voltages of non-slack buses, the
/// active power of slack generators and the reactive power of regulating
/// generators.
pub fn set_pf_vars(net: &mut Network) {
    net.set_flags(ObjType::Bus, FlagKind::Vars, BUS_PROP_NOT_SLACK, BUS_VAR_VMAG | BUS_VAR_VANG);
    net.set_flags(ObjType::Gen, FlagKind::Vars, GEN_PROP_SLACK, GEN_VAR_P);
    net.set_flags(ObjType::Gen, FlagKind::Vars, GEN_PROP_REG, GEN_VAR_Q);
}

/// Flags every quantity of every element as a variable, including the
/// voltage and control deviations.
pub fn set_all_vars(net: &mut Network) {
    net.set_flags(
        ObjType::Bus,
        FlagKind::Vars,
        BUS_PROP_ANY,
        BUS_VAR_VMAG | BUS_VAR_VANG | BUS_VAR_VDEV,
    );
    net.set_flags(
        ObjType::Branch,
        FlagKind::Vars,
        BRANCH_PROP_TAP_CHANGER,
        BRANCH_VAR_RATIO | BRANCH_VAR_RATIO_DEV,
    );
    net.set_flags(ObjType::Branch, FlagKind::Vars, BRANCH_PROP_PHASE_SHIFTER, BRANCH_VAR_PHASE);
    net.set_flags(ObjType::Gen, FlagKind::Vars, GEN_PROP_ANY, GEN_VAR_P | GEN_VAR_Q);
    net.set_flags(ObjType::Load, FlagKind::Vars, LOAD_PROP_ANY, LOAD_VAR_P | LOAD_VAR_Q);
    net.set_flags(
        ObjType::Shunt,
        FlagKind::Vars,
        SHUNT_PROP_SWITCHED_V,
        SHUNT_VAR_SUSC | SHUNT_VAR_SUSC_DEV,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cases_are_consistent() -> Result<()> {
        for name in CASE_NAMES {
            let mut net = by_name(name, 2)?;
            net.check()?;
            assert_eq!(net.num_periods(), 2);
            assert_eq!(net.num_slack_buses(), 1);
        }
        assert!(by_name("case9", 1).is_err());
        Ok(())
    }

    #[test]
    fn test_four_bus_devices() {
        let net = four_bus(1);
        assert_eq!(net.num_tap_changers_v(), 1);
        assert_eq!(net.num_phase_shifters(), 1);
        assert_eq!(net.num_switched_shunts(), 1);
        assert_eq!(net.bus(1).reg_gens(), &[1, 2]);
        assert!(net.bus(2).is_regulated_by_tran());
        assert!(net.bus(3).is_regulated_by_shunt());
    }

    #[test]
    fn test_set_all_vars() {
        let mut net = four_bus(1);
        set_all_vars(&mut net);
        // 4 buses × 4, ratio + 2 devs, phase, 3 gens × 2, 2 loads × 2, susc + 2 devs
        assert_eq!(net.num_vars(), 16 + 3 + 1 + 6 + 4 + 3);
    }
}
