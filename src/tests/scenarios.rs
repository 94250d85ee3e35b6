use std::f64::consts::PI;

use anyhow::Result;
use approx::assert_abs_diff_eq;

use super::{analyzed, newton_step};
use crate::*;

#[test]
fn test_two_bus_newton() -> Result<()> {
    let mut net = cases::two_bus();
    cases::set_pf_vars(&mut net);
    assert_eq!(net.num_vars(), 4);
    let p_slack = net.gen(0).var_index(GenVar::P, 0).unwrap();

    let mut p = Problem::new(&mut net);
    p.add_constr(ConstrType::Acpf);
    p.analyze();
    assert_eq!(p.j().rows(), 4);

    let mut x = p.init_point();
    p.eval(&x)?;
    assert_abs_diff_eq!(p.f()[2], -0.5, epsilon = 1e-12);

    for _ in 0..10 {
        if norm_inf(p.f()) <= 1e-10 {
            break;
        }
        let dx = newton_step(&p)?;
        sub_inplace(&mut x, &dx);
        p.eval(&x)?;
    }
    assert!(norm_inf(p.f()) <= 1e-10, "residual {}", norm_inf(p.f()));

    // lossless line
    assert_abs_diff_eq!(x[p_slack], 0.5, epsilon = 1e-9);
    drop(p);
    net.set_var_values(&x)?;
    assert_abs_diff_eq!(net.gen(0).p[0], 0.5, epsilon = 1e-9);
    Ok(())
}

#[test]
fn test_slack_generator_participation() -> Result<()> {
    let mut net = Network::new(NetOpt::default());
    let slack = net.add_bus(Bus {
        slack: true,
        ..Bus::new(1)
    });
    let pq = net.add_bus(Bus::new(2));
    for _ in 0..2 {
        net.add_gen(Gen {
            p: vec![0.4],
            p_max: 1.0,
            ..Gen::new(slack)
        })?;
    }
    net.add_load(Load::new(pq, 0.8, 0.0))?;
    net.add_branch(Branch::new(slack, pq, 0.0, 0.1))?;
    net.set_flags(ObjType::Gen, FlagKind::Vars, GEN_PROP_ANY, GEN_VAR_P);
    let p1 = net.gen(0).var_index(GenVar::P, 0).unwrap();
    let p2 = net.gen(1).var_index(GenVar::P, 0).unwrap();

    let mut p = Problem::new(&mut net);
    p.add_constr(ConstrType::ParGen);
    p.analyze();

    assert_eq!(p.a().rows(), 1);
    assert_eq!(p.a().nnz(), 2);
    let a = p.a().to_dense();
    assert_eq!(a[0][p1], 1.0);
    assert_eq!(a[0][p2], -1.0);
    assert_eq!(p.b(), &[0.0]);
    Ok(())
}

#[test]
fn test_pvpq_rows_with_fixed_generator() -> Result<()> {
    let mut net = Network::new(NetOpt::default());
    let slack = net.add_bus(Bus {
        slack: true,
        ..Bus::new(1)
    });
    let pv = net.add_bus(Bus {
        v_mag: vec![1.01],
        v_set: vec![1.01],
        ..Bus::new(2)
    });
    net.add_gen(Gen {
        p: vec![0.5],
        p_max: 2.0,
        ..Gen::new(slack)
    })?;
    for (q, q_par) in [(0.4, 1.0), (0.1, 2.0), (0.1, 4.0)] {
        net.add_gen(Gen {
            reg_bus: Some(pv),
            p: vec![0.2],
            q: vec![q],
            p_max: 0.5,
            q_max: 0.4,
            q_min: -0.2,
            q_par,
            ..Gen::new(pv)
        })?;
    }
    net.add_load(Load::new(pv, 1.0, 0.3))?;
    net.add_branch(Branch::new(slack, pv, 0.01, 0.1))?;
    cases::set_pf_vars(&mut net);

    let v = net.bus(pv).var_index(BusVar::VMag, 0).unwrap();
    let q: Vec<usize> = (1..4)
        .map(|g| net.gen(g).var_index(GenVar::Q, 0).unwrap())
        .collect();

    let mut p = Problem::new(&mut net);
    p.add_constr(ConstrType::PvpqSwitching);
    p.find_constr_mut(ConstrType::PvpqSwitching)
        .and_then(|c| c.as_any_mut().downcast_mut::<ConstrPvpqSwitching>())
        .unwrap()
        .set_fixed(q[0], true);
    p.analyze();

    // every row lists the voltage and the three reactive powers
    assert_eq!(p.a().rows(), 3);
    assert_eq!(p.a().nnz(), 3 * 4);
    let a = p.a().to_dense();
    assert_eq!((a[0][v], a[0][q[0]], a[0][q[1]], a[0][q[2]]), (1.0, 0.0, 0.0, 0.0));
    assert_eq!((a[1][v], a[1][q[0]], a[1][q[1]], a[1][q[2]]), (0.0, 1.0, 0.0, 0.0));
    assert_eq!((a[2][v], a[2][q[0]], a[2][q[1]], a[2][q[2]]), (0.0, 0.0, 4.0, -2.0));
    assert_eq!(p.b(), &[1.01, 0.4, 0.0]);
    Ok(())
}

#[test]
fn test_pvpq_heuristic_updates_rows() -> Result<()> {
    let mut net = cases::four_bus(1);
    cases::set_pf_vars(&mut net);
    let q1 = net.gen(1).var_index(GenVar::Q, 0).unwrap();
    let q2 = net.gen(2).var_index(GenVar::Q, 0).unwrap();

    let mut p = Problem::new(&mut net);
    p.add_constr(ConstrType::PvpqSwitching);
    p.add_heur(HeurType::PvpqSwitching);
    let mut x = analyzed(&mut p)?;
    // voltage row and pairing row of bus 2
    assert_eq!(p.b(), &[1.01, 0.0]);

    x[q1] = 0.6;
    p.apply_heuristics(&mut x)?;
    assert_eq!(x[q1], 0.4);
    assert_eq!(p.b(), &[1.01, 0.4]);

    x[q2] = -0.5;
    p.apply_heuristics(&mut x)?;
    assert_eq!(p.b(), &[0.4, -0.2]);
    assert_eq!(p.a().rows(), 2);
    Ok(())
}

#[test]
fn test_generator_cost() -> Result<()> {
    let mut net = cases::two_bus();
    {
        let gen = net.gen_mut(0);
        gen.cost_coeff_q0 = 10.0;
        gen.cost_coeff_q1 = 20.0;
        gen.cost_coeff_q2 = 5.0;
    }
    net.set_flags(ObjType::Gen, FlagKind::Vars, GEN_PROP_ANY, GEN_VAR_P);
    let ip = net.gen(0).var_index(GenVar::P, 0).unwrap();

    let mut p = Problem::new(&mut net);
    p.add_func(FuncType::GenCost, 1.0);
    p.analyze();
    let mut x = p.init_point();
    x[ip] = 0.5;
    p.eval(&x)?;

    assert_abs_diff_eq!(p.phi(), 21.25, epsilon = 1e-12);
    assert_abs_diff_eq!(p.gphi()[ip], 25.0, epsilon = 1e-12);
    assert_eq!(p.hphi().to_dense()[ip][ip], 10.0);

    // weights scale every derivative
    p.add_func(FuncType::GenCost, 0.5);
    p.analyze();
    p.eval(&x)?;
    assert_abs_diff_eq!(p.phi(), 1.5 * 21.25, epsilon = 1e-12);
    assert_abs_diff_eq!(p.gphi()[ip], 1.5 * 25.0, epsilon = 1e-12);
    assert_abs_diff_eq!(p.hphi().to_dense()[ip][ip], 15.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_phase_range_floor() -> Result<()> {
    let mut net = cases::four_bus(1);
    {
        let branch = net.branch_mut(2);
        branch.phase = vec![0.5];
        branch.phase_min = 0.5;
        branch.phase_max = 0.5;
    }
    net.set_flags(ObjType::Branch, FlagKind::Vars, BRANCH_PROP_PHASE_SHIFTER, BRANCH_VAR_PHASE);
    assert_eq!(net.num_vars(), 1);

    let mut p = Problem::new(&mut net);
    p.add_func(FuncType::RegPhase, 1.0);
    p.analyze();
    p.eval(&[0.5 + PI])?;
    assert_abs_diff_eq!(p.phi(), 0.5, epsilon = 1e-4);
    Ok(())
}

#[test]
fn test_sensitivities_reach_elements() -> Result<()> {
    let mut net = cases::three_bus(1);
    net.set_flags(ObjType::Bus, FlagKind::Vars, BUS_PROP_NOT_SLACK, BUS_VAR_VMAG | BUS_VAR_VANG);
    net.set_flags(ObjType::Gen, FlagKind::Vars, GEN_PROP_ANY, GEN_VAR_P);
    net.set_flags(ObjType::Gen, FlagKind::Fixed, GEN_PROP_SLACK, GEN_VAR_P);
    net.set_flags(ObjType::Gen, FlagKind::Bounded, GEN_PROP_NOT_SLACK, GEN_VAR_P);

    let mut p = Problem::new(&mut net);
    p.add_constr(ConstrType::Fix);
    p.add_constr(ConstrType::Linpf);
    p.add_constr(ConstrType::Lbound);
    p.analyze();
    // fixed slack power, then P and Q balance of three buses
    assert_eq!(p.b().len(), 1 + 6);
    assert_eq!(p.l().len(), 1);

    let mut sa = vec![0.0; 7];
    sa[3] = 1.0;
    p.store_sens(&sa, &[], &[2.5], &[0.0])?;
    drop(p);

    assert_eq!(net.bus(1).sens_p_balance[0], 1.0);
    assert_eq!(net.bus(0).sens_p_balance[0], 0.0);
    assert_eq!(net.bus(1).sens_q_balance[0], 0.0);
    assert_eq!(net.gen(1).sens_p_u_bound[0], 2.5);
    assert_eq!(net.gen(1).sens_p_l_bound[0], 0.0);
    Ok(())
}

#[test]
fn test_balance_and_regulation_sensitivities() -> Result<()> {
    let mut net = cases::four_bus(1);
    cases::set_all_vars(&mut net);

    let mut p = Problem::new(&mut net);
    p.add_constr(ConstrType::Acpf);
    p.add_constr(ConstrType::RegGen);
    p.add_constr(ConstrType::RegTran);
    p.add_constr(ConstrType::RegShunt);
    p.analyze();
    // voltage split rows: buses 1 and 2 by generators, 3 by the tap
    // changer and 4 by the shunt
    assert_eq!(p.b().len(), 4);
    assert_eq!(p.f().len(), 8 + 6 + 2 + 2);

    let sa = [1.0, 2.0, 3.0, 4.0];
    let sf: Vec<f64> = (0..p.f().len()).map(|i| 10.0 + i as f64).collect();
    p.store_sens(&sa, &sf, &[], &[])?;
    drop(p);

    // balance rows follow the bus visiting order of the branches
    for (bus, row) in [(0, 0), (1, 2), (2, 4), (3, 6)] {
        assert_eq!(net.bus(bus).sens_p_balance[0], sf[row]);
        assert_eq!(net.bus(bus).sens_q_balance[0], sf[row + 1]);
    }
    assert_eq!(net.bus(0).sens_v_reg_by_gen[0], 1.0);
    assert_eq!(net.bus(1).sens_v_reg_by_gen[0], 2.0);
    assert_eq!(net.bus(2).sens_v_reg_by_tran[0], 3.0);
    assert_eq!(net.bus(3).sens_v_reg_by_shunt[0], 4.0);
    assert_eq!(net.bus(2).sens_v_reg_by_gen[0], 0.0);
    Ok(())
}

#[test]
fn test_eval_requires_current_analysis() -> Result<()> {
    let mut net = cases::three_bus(1);
    cases::set_pf_vars(&mut net);
    let mut p = Problem::new(&mut net);
    p.add_constr(ConstrType::Acpf);

    let x = p.init_point();
    assert_eq!(p.eval(&x), Err(ProblemError::NotAnalyzed));
    assert!(p.has_error());
    assert!(p.combine_h(&[], false).is_err());
    assert!(p.store_sens(&[], &[], &[], &[]).is_err());

    p.analyze();
    p.clear_error();
    p.eval(&x)?;
    assert!(!p.has_error());

    // new variables leave the structure stale
    p.network_mut()
        .set_flags(ObjType::Gen, FlagKind::Vars, GEN_PROP_ANY, GEN_VAR_P);
    let x = p.init_point();
    assert_eq!(p.eval(&x), Err(ProblemError::NotAnalyzed));
    p.analyze();
    p.eval(&x)?;

    // so does a component added after the analysis
    p.add_func(FuncType::GenCost, 1.0);
    assert_eq!(p.eval(&x), Err(ProblemError::NotAnalyzed));
    Ok(())
}
