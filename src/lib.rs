//! Pharmacokinetic parameter estimation from concentration-time data
//!
//! The crate takes a single-dose concentration-time profile and estimates PK
//! parameters three ways:
//!
//! - **NCA** ([`run_nca`]): model-free lambda_z, half-life, AUC, CL and Vz
//!   from trapezoidal integration and a log-linear terminal-phase regression.
//! - **Model fitting** ([`fit_model`]): nonlinear least squares over five
//!   compartmental models, each available in closed form or as an ODE system
//!   integrated with a BDF solver.
//! - **Model comparison** ([`compare_models`]): parallel fits of every
//!   applicable model, ranked by AIC.
//!
//! ```no_run
//! use pkfit::{compare_models, run_nca, Method, NcaOptions, Profile};
//!
//! # fn main() -> Result<(), pkfit::PkError> {
//! let profile = Profile::from_csv_path("concentrations.csv")?;
//!
//! let nca = run_nca(&profile, &NcaOptions::default().with_dose(100.0))?;
//! println!("t1/2 = {:.2}, CL = {:.3}", nca.half_life, nca.clearance.unwrap());
//!
//! let table = compare_models(&profile, Method::Exponential, Some(100.0), None, None);
//! if let Some(best) = table.best() {
//!     println!("best model: {} (AIC {:.1})", best.model, best.aic);
//! }
//! # Ok(())
//! # }
//! ```

pub mod compare;
pub mod data;
pub mod error;
pub mod fit;
pub mod model;
pub mod nca;
pub mod simulator;

pub use compare::{compare_models, compare_models_with, ComparisonEntry, ComparisonTable, FitOutcome};
pub use data::{DataError, Profile};
pub use error::PkError;
pub use fit::{fit_model, fit_model_with, FitError, FitOptions, FitResult};
pub use model::{Dosing, Model, ModelError};
pub use nca::{
    run_nca, AucMethod, NcaError, NcaOptions, NcaResult, TerminalFit, TerminalOptions,
    TerminalPoint, TerminalSelection, TerminalWindow,
};
pub use simulator::{concentrations, Method, SolverError, SolverOptions};

pub mod prelude {
    pub use crate::compare::{compare_models, compare_models_with, ComparisonTable, FitOutcome};
    pub use crate::data::Profile;
    pub use crate::error::PkError;
    pub use crate::fit::{fit_model, fit_model_with, FitOptions, FitResult};
    pub use crate::model::{Dosing, Model};
    pub use crate::nca::{run_nca, AucMethod, NcaOptions, NcaResult, TerminalSelection};
    pub use crate::simulator::{concentrations, Method, SolverOptions};
}
