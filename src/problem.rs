use std::fmt;

use crate::constr::{analyze_constr, new_constr, ConstrType, Constraint, Counters, Sens};
use crate::debug::{format_f64, format_f64_vec};
use crate::func::{new_func, FuncType, Function};
use crate::heur::{new_heur, HeurType, Heuristic};
use sparsetools::coo::Coo;

use crate::sparse::extend_shifted;
use crate::{Network, ProblemError, VarValues};

/// Sizes of the network and of the component lists seen by the last
/// analyze. Evaluation needs the current ones to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Shape {
    num_vars: usize,
    num_periods: usize,
    num_buses: usize,
    num_branches: usize,
    num_constrs: usize,
    num_funcs: usize,
}

/// Problem assembles the constraints and functions defined over a network
/// into aggregate matrices and vectors for a solver:
///
///   minimize φ(x) subject to A·x = b, f(x) = 0, l ≤ G·x ≤ u.
///
/// Rows of every aggregate are the rows of the components concatenated in
/// the order the components were added. Sparse matrices are in coordinate
/// form; the Hessians hold both triangles.
pub struct Problem<'a> {
    net: &'a mut Network,

    constrs: Vec<Box<dyn Constraint>>,
    funcs: Vec<Box<dyn Function>>,
    heurs: Vec<Box<dyn Heuristic>>,

    a: Coo<usize, f64>,
    b: Vec<f64>,
    g: Coo<usize, f64>,
    l: Vec<f64>,
    u: Vec<f64>,
    j: Coo<usize, f64>,
    f: Vec<f64>,
    h_combined: Coo<usize, f64>,
    hphi: Coo<usize, f64>,
    gphi: Vec<f64>,
    phi: f64,

    analyzed: Option<Shape>,
    error: Option<ProblemError>,
}

impl<'a> Problem<'a> {
    pub fn new(net: &'a mut Network) -> Self {
        Self {
            net,
            constrs: Vec::new(),
            funcs: Vec::new(),
            heurs: Vec::new(),
            a: Coo::with_size(0, 0),
            b: Vec::new(),
            g: Coo::with_size(0, 0),
            l: Vec::new(),
            u: Vec::new(),
            j: Coo::with_size(0, 0),
            f: Vec::new(),
            h_combined: Coo::with_size(0, 0),
            hphi: Coo::with_size(0, 0),
            gphi: Vec::new(),
            phi: 0.0,
            analyzed: None,
            error: None,
        }
    }

    /// Replaces the network. Components are kept and the problem has to be
    /// analyzed again.
    pub fn set_network(&mut self, net: &'a mut Network) {
        self.net = net;
        self.clear_aggregates();
        for c in self.constrs.iter_mut() {
            c.init(&*self.net);
        }
        for f in self.funcs.iter_mut() {
            f.init(&*self.net);
        }
    }

    pub fn network(&self) -> &Network {
        &*self.net
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut *self.net
    }

    /// Removes all components and aggregates and clears the error.
    pub fn clear(&mut self) {
        self.constrs.clear();
        self.funcs.clear();
        self.heurs.clear();
        self.clear_aggregates();
        self.error = None;
    }

    fn clear_aggregates(&mut self) {
        self.a = Coo::with_size(0, 0);
        self.b.clear();
        self.g = Coo::with_size(0, 0);
        self.l.clear();
        self.u.clear();
        self.j = Coo::with_size(0, 0);
        self.f.clear();
        self.h_combined = Coo::with_size(0, 0);
        self.hphi = Coo::with_size(0, 0);
        self.gphi.clear();
        self.phi = 0.0;
        self.analyzed = None;
    }

    /// Adds a constraint unless one of the same type is already present.
    pub fn add_constr(&mut self, constr_type: ConstrType) {
        if self.find_constr(constr_type).is_some() {
            return;
        }
        let mut c = new_constr(constr_type);
        c.init(&*self.net);
        log::debug!("added constraint {}", constr_type);
        self.constrs.push(c);
    }

    pub fn add_constr_tag(&mut self, tag: i32) -> Result<(), ProblemError> {
        let constr_type = ConstrType::try_from(tag).map_err(|err| self.record(err))?;
        self.add_constr(constr_type);
        Ok(())
    }

    pub fn add_func(&mut self, func_type: FuncType, weight: f64) {
        let mut f = new_func(func_type, weight);
        f.init(&*self.net);
        log::debug!("added function {} with weight {}", func_type, format_f64(weight));
        self.funcs.push(f);
    }

    pub fn add_func_tag(&mut self, tag: i32, weight: f64) -> Result<(), ProblemError> {
        let func_type = FuncType::try_from(tag).map_err(|err| self.record(err))?;
        self.add_func(func_type, weight);
        Ok(())
    }

    pub fn add_heur(&mut self, heur_type: HeurType) {
        log::debug!("added heuristic {}", heur_type);
        self.heurs.push(new_heur(heur_type));
    }

    pub fn add_heur_tag(&mut self, tag: i32) -> Result<(), ProblemError> {
        let heur_type = HeurType::try_from(tag).map_err(|err| self.record(err))?;
        self.add_heur(heur_type);
        Ok(())
    }

    /// First constraint of the given type.
    pub fn find_constr(&self, constr_type: ConstrType) -> Option<&dyn Constraint> {
        for c in &self.constrs {
            if c.constr_type() == constr_type {
                return Some(c.as_ref());
            }
        }
        None
    }

    pub fn find_constr_mut(&mut self, constr_type: ConstrType) -> Option<&mut (dyn Constraint + 'static)> {
        self.constrs
            .iter_mut()
            .find(|c| c.constr_type() == constr_type)
            .map(|c| c.as_mut())
    }

    pub fn constrs(&self) -> &[Box<dyn Constraint>] {
        &self.constrs
    }

    pub fn funcs(&self) -> &[Box<dyn Function>] {
        &self.funcs
    }

    /// Builds the structure of all components and of the aggregates.
    pub fn analyze(&mut self) {
        let net: &Network = &*self.net;
        let nt = net.num_periods();
        let nbr = net.branches().len();

        self.constrs.iter_mut().for_each(|c| c.clear(net));
        self.funcs.iter_mut().for_each(|f| f.clear(net));
        for t in 0..nt {
            for br in 0..nbr {
                self.constrs.iter_mut().for_each(|c| c.count_step(net, br, t));
                self.funcs.iter_mut().for_each(|f| f.count_step(net, br, t));
            }
        }
        let counted: Vec<Counters> = self.constrs.iter().map(|c| c.base().counters()).collect();
        let counted_h: Vec<usize> = self.funcs.iter().map(|f| f.base().hphi_nnz()).collect();

        self.constrs.iter_mut().for_each(|c| c.allocate(net));
        self.funcs.iter_mut().for_each(|f| f.allocate(net));
        self.constrs.iter_mut().for_each(|c| c.clear(net));
        self.funcs.iter_mut().for_each(|f| f.clear(net));
        for t in 0..nt {
            for br in 0..nbr {
                self.constrs.iter_mut().for_each(|c| c.analyze_step(net, br, t));
                self.funcs.iter_mut().for_each(|f| f.analyze_step(net, br, t));
            }
        }
        for (c, counted) in self.constrs.iter().zip(counted) {
            assert_eq!(counted, c.base().counters(), "{} count and analyze walks differ", c.name());
        }
        for (f, counted) in self.funcs.iter().zip(counted_h) {
            assert_eq!(counted, f.base().hphi_nnz(), "{} count and analyze walks differ", f.name());
        }

        self.update_nonlin_struc();
        self.update_lin();
        self.analyzed = Some(self.shape());
        log::debug!(
            "analyzed problem: {} variables, {} linear equalities, {} nonlinear equalities, {} inequalities",
            self.net.num_vars(),
            self.b.len(),
            self.f.len(),
            self.l.len()
        );
    }

    /// Evaluates all components at `x` and updates the network properties.
    pub fn eval(&mut self, x: &[f64]) -> Result<(), ProblemError> {
        self.check_analyzed()?;
        self.check_size("x", self.net.num_vars(), x.len())?;
        log::trace!("eval at {}", format_f64_vec(x));

        self.net.clear_properties();
        {
            let net: &Network = &*self.net;
            self.constrs.iter_mut().for_each(|c| c.clear(net));
            self.funcs.iter_mut().for_each(|f| f.clear(net));
        }
        for t in 0..self.net.num_periods() {
            for br in 0..self.net.branches().len() {
                let net: &Network = &*self.net;
                self.constrs.iter_mut().for_each(|c| c.eval_step(net, br, t, x));
                self.funcs.iter_mut().for_each(|f| f.eval_step(net, br, t, x));
                self.net.update_properties_step(br, t, x);
            }
        }
        self.update_nonlin_data();
        log::trace!("phi = {}, f = {}", format_f64(self.phi), format_f64_vec(&self.f));
        Ok(())
    }

    /// Computes the combined constraint Hessian Σ λ_j ∇²f_j.
    pub fn combine_h(&mut self, lambda: &[f64], ensure_psd: bool) -> Result<(), ProblemError> {
        self.check_analyzed()?;
        self.check_size("lambda", self.f.len(), lambda.len())?;

        let mut offset = 0;
        for c in self.constrs.iter_mut() {
            let m = c.base().j().rows();
            c.combine_h(&lambda[offset..offset + m], ensure_psd);
            offset += m;
        }
        let data = self.h_combined.values_mut();
        let mut k = 0;
        for c in &self.constrs {
            for &d in c.base().h_comb().values() {
                data[k] = d;
                k += 1;
            }
        }
        Ok(())
    }

    /// Runs the heuristics at `x`, which they may modify, and rebuilds the
    /// linear constraints.
    pub fn apply_heuristics(&mut self, x: &mut [f64]) -> Result<(), ProblemError> {
        self.check_analyzed()?;
        self.check_size("x", self.net.num_vars(), x.len())?;

        for h in self.heurs.iter_mut() {
            h.clear(&*self.net);
        }
        for t in 0..self.net.num_periods() {
            for br in 0..self.net.branches().len() {
                for h in self.heurs.iter_mut() {
                    h.apply_step(&mut self.constrs, &mut *self.net, br, t, x);
                }
            }
        }
        for c in self.constrs.iter_mut().filter(|c| c.has_switching_structure()) {
            analyze_constr(c.as_mut(), &*self.net);
        }
        self.update_lin();
        Ok(())
    }

    /// Hands the duals of the linear equalities, the nonlinear equalities
    /// and the inequality bounds to the constraints owning the rows.
    pub fn store_sens(
        &mut self,
        sa: &[f64],
        sf: &[f64],
        sgu: &[f64],
        sgl: &[f64],
    ) -> Result<(), ProblemError> {
        self.check_analyzed()?;
        self.check_size("sA", self.b.len(), sa.len())?;
        self.check_size("sf", self.f.len(), sf.len())?;
        self.check_size("sGu", self.l.len(), sgu.len())?;
        self.check_size("sGl", self.l.len(), sgl.len())?;

        let mut sens = Vec::with_capacity(self.constrs.len());
        let (mut ka, mut kf, mut kg) = (0, 0, 0);
        for c in &self.constrs {
            let (na, nf, ng) = (c.base().a().rows(), c.base().j().rows(), c.base().g().rows());
            sens.push(Sens {
                sa: &sa[ka..ka + na],
                sf: &sf[kf..kf + nf],
                sgu: &sgu[kg..kg + ng],
                sgl: &sgl[kg..kg + ng],
            });
            ka += na;
            kf += nf;
            kg += ng;
        }

        {
            let net: &Network = &*self.net;
            self.constrs.iter_mut().for_each(|c| c.clear(net));
        }
        for t in 0..self.net.num_periods() {
            for br in 0..self.net.branches().len() {
                for (c, sens) in self.constrs.iter_mut().zip(&sens) {
                    c.store_sens_step(&mut *self.net, br, t, sens);
                }
            }
        }
        Ok(())
    }

    fn shape(&self) -> Shape {
        Shape {
            num_vars: self.net.num_vars(),
            num_periods: self.net.num_periods(),
            num_buses: self.net.buses().len(),
            num_branches: self.net.branches().len(),
            num_constrs: self.constrs.len(),
            num_funcs: self.funcs.len(),
        }
    }

    /// Fails unless the components were analyzed for the current network
    /// and component lists.
    fn check_analyzed(&mut self) -> Result<(), ProblemError> {
        if self.analyzed != Some(self.shape()) {
            return Err(self.record(ProblemError::NotAnalyzed));
        }
        Ok(())
    }

    fn check_size(&mut self, name: &'static str, expected: usize, actual: usize) -> Result<(), ProblemError> {
        if expected != actual {
            return Err(self.record(ProblemError::InvalidVectorSize {
                name,
                expected,
                actual,
            }));
        }
        Ok(())
    }

    fn record(&mut self, err: ProblemError) -> ProblemError {
        log::warn!("{}", err);
        self.error = Some(err.clone());
        err
    }

    fn update_nonlin_struc(&mut self) {
        let n = self.net.num_vars();

        let rows: usize = self.constrs.iter().map(|c| c.base().j().rows()).sum();
        let nnz: usize = self.constrs.iter().map(|c| c.base().j().nnz()).sum();
        self.j = Coo::with_capacity(rows, n, nnz);
        self.f = vec![0.0; rows];
        let mut offset = 0;
        for c in &self.constrs {
            extend_shifted(&mut self.j, c.base().j(), offset);
            offset += c.base().j().rows();
        }

        let nnz: usize = self.constrs.iter().map(|c| c.base().h_comb().nnz()).sum();
        self.h_combined = Coo::with_capacity(n, n, nnz);
        for c in &self.constrs {
            let h = c.base().h_comb();
            self.h_combined.extend(h.rowidx(), h.colidx(), h.values());
        }

        let nnz: usize = self.funcs.iter().map(|f| f.base().hphi().nnz()).sum();
        self.hphi = Coo::with_capacity(n, n, nnz);
        for f in &self.funcs {
            let h = f.base().hphi();
            self.hphi.extend(h.rowidx(), h.colidx(), h.values());
        }
        self.gphi = vec![0.0; n];
        self.phi = 0.0;
    }

    /// Copies the linear equalities and inequalities of the constraints
    /// into the aggregates.
    fn update_lin(&mut self) {
        let n = self.net.num_vars();

        let rows: usize = self.constrs.iter().map(|c| c.base().a().rows()).sum();
        let nnz: usize = self.constrs.iter().map(|c| c.base().a().nnz()).sum();
        self.a = Coo::with_capacity(rows, n, nnz);
        self.b = Vec::with_capacity(rows);
        let mut offset = 0;
        for c in &self.constrs {
            extend_shifted(&mut self.a, c.base().a(), offset);
            offset += c.base().a().rows();
            self.b.extend_from_slice(c.base().b());
        }

        let rows: usize = self.constrs.iter().map(|c| c.base().g().rows()).sum();
        let nnz: usize = self.constrs.iter().map(|c| c.base().g().nnz()).sum();
        self.g = Coo::with_capacity(rows, n, nnz);
        self.l = Vec::with_capacity(rows);
        self.u = Vec::with_capacity(rows);
        let mut offset = 0;
        for c in &self.constrs {
            extend_shifted(&mut self.g, c.base().g(), offset);
            offset += c.base().g().rows();
            self.l.extend_from_slice(c.base().l());
            self.u.extend_from_slice(c.base().u());
        }
    }

    fn update_nonlin_data(&mut self) {
        self.phi = 0.0;
        self.gphi.iter_mut().for_each(|g| *g = 0.0);
        let hphi = self.hphi.values_mut();
        let mut k = 0;
        for f in &self.funcs {
            let base = f.base();
            let w = base.weight();
            self.phi += w * base.phi();
            for (g, gi) in self.gphi.iter_mut().zip(base.gphi()) {
                *g += w * gi;
            }
            for &d in base.hphi().values() {
                hphi[k] = w * d;
                k += 1;
            }
        }

        let jd = self.j.values_mut();
        let (mut k, mut offset) = (0, 0);
        for c in &self.constrs {
            let base = c.base();
            for &d in base.j().values() {
                jd[k] = d;
                k += 1;
            }
            self.f[offset..offset + base.f().len()].copy_from_slice(base.f());
            offset += base.f().len();
        }
    }

    pub fn a(&self) -> &Coo<usize, f64> {
        &self.a
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    pub fn g(&self) -> &Coo<usize, f64> {
        &self.g
    }

    pub fn l(&self) -> &[f64] {
        &self.l
    }

    pub fn u(&self) -> &[f64] {
        &self.u
    }

    pub fn j(&self) -> &Coo<usize, f64> {
        &self.j
    }

    pub fn f(&self) -> &[f64] {
        &self.f
    }

    pub fn h_combined(&self) -> &Coo<usize, f64> {
        &self.h_combined
    }

    pub fn hphi(&self) -> &Coo<usize, f64> {
        &self.hphi
    }

    pub fn gphi(&self) -> &[f64] {
        &self.gphi
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Current values of the variables.
    pub fn init_point(&self) -> Vec<f64> {
        self.net.get_var_values(VarValues::Current)
    }

    pub fn upper_limits(&self) -> Vec<f64> {
        self.net.get_var_values(VarValues::UpperLimits)
    }

    pub fn lower_limits(&self) -> Vec<f64> {
        self.net.get_var_values(VarValues::LowerLimits)
    }

    pub fn num_primal_variables(&self) -> usize {
        self.net.num_vars()
    }

    pub fn num_linear_equality_constraints(&self) -> usize {
        self.b.len()
    }

    pub fn num_nonlinear_equality_constraints(&self) -> usize {
        self.f.len()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&ProblemError> {
        self.error.as_ref()
    }

    pub fn error_string(&self) -> String {
        self.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

impl fmt::Display for Problem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Problem")?;
        writeln!(f, "  functions")?;
        for func in &self.funcs {
            writeln!(
                f,
                "    {:<15} weight {:<8} value {}",
                func.name(),
                format_f64(func.base().weight()),
                format_f64(func.base().phi())
            )?;
        }
        writeln!(f, "  constraints")?;
        for c in &self.constrs {
            let counters = c.base().counters();
            writeln!(
                f,
                "    {:<15} A {}x{} ({} nnz), G {} rows, J {} rows ({} nnz)",
                c.name(),
                counters.a_row,
                self.net.num_vars(),
                counters.a_nnz,
                counters.g_row,
                counters.j_row,
                counters.j_nnz
            )?;
        }
        writeln!(f, "  variables          : {}", self.num_primal_variables())?;
        writeln!(f, "  linear equalities  : {}", self.num_linear_equality_constraints())?;
        writeln!(f, "  nonlinear equal.   : {}", self.num_nonlinear_equality_constraints())?;
        writeln!(f, "  inequalities       : {}", self.l.len())?;
        write!(f, "  objective          : {}", format_f64(self.phi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases;

    #[test]
    fn test_add_components() {
        let mut net = cases::three_bus(1);
        let mut p = Problem::new(&mut net);
        p.add_constr(ConstrType::Acpf);
        p.add_constr(ConstrType::Acpf);
        p.add_constr_tag(ConstrType::ParGen.tag()).unwrap();
        p.add_func(FuncType::GenCost, 1.0);
        assert_eq!(p.constrs().len(), 2);
        assert_eq!(p.funcs().len(), 1);
        assert!(p.find_constr(ConstrType::ParGen).is_some());
        assert!(p.find_constr(ConstrType::Fix).is_none());
        assert!(!p.has_error());

        assert_eq!(
            p.add_constr_tag(99),
            Err(ProblemError::UnknownConstrType("99".to_string()))
        );
        assert!(p.has_error());
        assert_eq!(p.error_string(), "unknown constraint type 99");
        assert!(p.add_func_tag(-4, 1.0).is_err());
        assert!(p.add_heur_tag(7).is_err());

        p.clear();
        assert!(!p.has_error());
        assert!(p.constrs().is_empty());
    }

    #[test]
    fn test_size_errors() {
        let mut net = cases::three_bus(1);
        cases::set_pf_vars(&mut net);
        let n = net.num_vars();
        let mut p = Problem::new(&mut net);
        p.add_constr(ConstrType::Acpf);
        p.analyze();

        let err = p.eval(&vec![0.0; n + 1]).unwrap_err();
        assert_eq!(
            err,
            ProblemError::InvalidVectorSize {
                name: "x",
                expected: n,
                actual: n + 1
            }
        );
        assert!(p.error_string().starts_with("invalid vector size"));
        p.clear_error();

        assert!(p.combine_h(&[1.0], false).is_err());
        assert!(p.store_sens(&[], &[0.0; 3], &[], &[]).is_err());
        assert!(p.has_error());
    }
}
