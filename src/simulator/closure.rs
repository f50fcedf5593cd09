//! diffsol operator plumbing for the compartmental ODE systems
//!
//! `PkProblem` adapts a `(Model, Dosing, params)` triple to diffsol's
//! `OdeEquations` family. The mass matrix is identity, there are no root or
//! extra output functions, and the initial state carries any bolus amount.

use diffsol::{ConstantOp, LinearOp, NonLinearOp, NonLinearOpJacobian, OdeEquations, OdeEquationsRef, Op};
use nalgebra::DVector;

use crate::model::{Dosing, Model};
use crate::simulator::{M, T, V};

pub(crate) struct PkRhs<'a> {
    model: Model,
    dosing: &'a Dosing,
    p: &'a [f64],
    nstates: usize,
}

impl Op for PkRhs<'_> {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.p.len()
    }
}

impl NonLinearOp for PkRhs<'_> {
    fn call_inplace(&self, x: &Self::V, t: Self::T, y: &mut Self::V) {
        let rateiv = self.dosing.rate_at(t);
        self.model.rhs(x, self.p, t, y, rateiv);
    }
}

impl NonLinearOpJacobian for PkRhs<'_> {
    // All systems here are linear in the state, so the jacobian action is the
    // RHS applied to the direction with the input rate zeroed.
    fn jac_mul_inplace(&self, _x: &Self::V, t: Self::T, v: &Self::V, y: &mut Self::V) {
        self.model.rhs(v, self.p, t, y, 0.0);
    }
}

pub(crate) struct PkMass {
    nstates: usize,
    nparams: usize,
}

impl Op for PkMass {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl LinearOp for PkMass {
    fn gemv_inplace(&self, _x: &Self::V, _t: Self::T, _beta: Self::T, _y: &mut Self::V) {}
}

pub(crate) struct PkInit {
    nstates: usize,
    nparams: usize,
    init: V,
}

impl Op for PkInit {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl ConstantOp for PkInit {
    fn call_inplace(&self, _t: Self::T, y: &mut Self::V) {
        y.copy_from(&self.init);
    }
}

pub(crate) struct PkRoot {
    nstates: usize,
    nparams: usize,
}

impl Op for PkRoot {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl NonLinearOp for PkRoot {
    fn call_inplace(&self, _x: &Self::V, _t: Self::T, _y: &mut Self::V) {}
}

pub(crate) struct PkOut {
    nstates: usize,
    nparams: usize,
}

impl Op for PkOut {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.nparams
    }
}

impl NonLinearOp for PkOut {
    fn call_inplace(&self, _x: &Self::V, _t: Self::T, _y: &mut Self::V) {}
}

pub(crate) struct PkProblem {
    model: Model,
    dosing: Dosing,
    p: Vec<f64>,
    nstates: usize,
    init: V,
}

impl PkProblem {
    pub(crate) fn new(model: Model, dosing: Dosing, p: Vec<f64>) -> Self {
        let nstates = model.nstates();
        let init = model.initial_state(&dosing);
        Self {
            model,
            dosing,
            p,
            nstates,
            init,
        }
    }
}

impl Op for PkProblem {
    type T = T;
    type V = V;
    type M = M;
    fn nstates(&self) -> usize {
        self.nstates
    }
    fn nout(&self) -> usize {
        self.nstates
    }
    fn nparams(&self) -> usize {
        self.p.len()
    }
}

impl<'b> OdeEquationsRef<'b> for PkProblem {
    type Rhs = PkRhs<'b>;
    type Mass = PkMass;
    type Init = PkInit;
    type Root = PkRoot;
    type Out = PkOut;
}

impl OdeEquations for PkProblem {
    fn rhs(&self) -> PkRhs<'_> {
        PkRhs {
            model: self.model,
            dosing: &self.dosing,
            p: &self.p,
            nstates: self.nstates,
        }
    }

    fn mass(&self) -> Option<PkMass> {
        None
    }

    fn init(&self) -> PkInit {
        PkInit {
            nstates: self.nstates,
            nparams: self.p.len(),
            init: self.init.clone(),
        }
    }

    fn root(&self) -> Option<PkRoot> {
        None
    }

    fn out(&self) -> Option<PkOut> {
        None
    }

    fn get_params(&self, p: &mut V) {
        p.copy_from(&DVector::from_vec(self.p.clone()));
    }

    fn set_params(&mut self, p: &V) {
        self.p = p.iter().cloned().collect();
    }
}
