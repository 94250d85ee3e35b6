use derive_builder::Builder;

/// Network options.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(default, build_fn(validate = "Self::validate"))]
pub struct NetOpt {
    /// System MVA base used for converting power into per-unit quantities.
    /// Default value is 100.
    pub base_power: f64,

    /// Number of time periods of the horizon. Default value is 1.
    pub num_periods: usize,
}

impl Default for NetOpt {
    fn default() -> Self {
        Self {
            base_power: 100.0,
            num_periods: 1,
        }
    }
}

impl NetOptBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(t) = self.num_periods {
            if t == 0 {
                return Err("number of periods must be at least 1".to_string());
            }
        }
        if let Some(base) = self.base_power {
            if base <= 0.0 {
                return Err(format!("base power must be positive ({})", base));
            }
        }
        Ok(())
    }
}

/// Options of the PV/PQ switching heuristic.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(default)]
pub struct PvpqOpt {
    /// Reactive power limit violation (p.u.) tolerated before a regulator
    /// is fixed at its limit. Default value is 1e-4.
    pub q_tol: f64,

    /// Voltage deviation (p.u.) from the set point tolerated before a
    /// saturated regulator is released. Default value is 1e-4.
    pub v_tol: f64,
}

impl Default for PvpqOpt {
    fn default() -> Self {
        Self {
            q_tol: 1e-4,
            v_tol: 1e-4,
        }
    }
}
