use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::types::LoanStatus;

/// who may drive a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    /// requested by a reviewer
    Manual,
    /// driven by funding or repayment
    Automatic,
}

/// an edge of the loan state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: LoanStatus,
    pub to: LoanStatus,
    pub kind: TransitionKind,
}

/// every legal transition; nothing else exists
pub const EDGES: [Edge; 6] = [
    Edge { from: LoanStatus::Pending, to: LoanStatus::Approved, kind: TransitionKind::Manual },
    Edge { from: LoanStatus::Pending, to: LoanStatus::Rejected, kind: TransitionKind::Manual },
    Edge { from: LoanStatus::Rejected, to: LoanStatus::Pending, kind: TransitionKind::Manual },
    Edge { from: LoanStatus::Approved, to: LoanStatus::Funding, kind: TransitionKind::Automatic },
    Edge { from: LoanStatus::Funding, to: LoanStatus::Disbursed, kind: TransitionKind::Automatic },
    Edge { from: LoanStatus::Disbursed, to: LoanStatus::Closed, kind: TransitionKind::Automatic },
];

/// funding and repayment facts the guards depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardContext {
    pub amount_requested: Money,
    pub amount_funded: Money,
    pub all_installments_paid: bool,
}

/// loan status state machine
pub struct LoanStateMachine;

impl LoanStateMachine {
    pub fn edge(from: LoanStatus, to: LoanStatus) -> Option<&'static Edge> {
        EDGES.iter().find(|e| e.from == from && e.to == to)
    }

    /// states reachable from `from` in one step
    pub fn successors(from: LoanStatus) -> impl Iterator<Item = LoanStatus> {
        EDGES.iter().filter(move |e| e.from == from).map(|e| e.to)
    }

    pub fn is_terminal(status: LoanStatus) -> bool {
        Self::successors(status).next().is_none()
    }

    /// validate a transition of the given kind
    pub fn check(
        from: LoanStatus,
        to: LoanStatus,
        kind: TransitionKind,
        ctx: &GuardContext,
    ) -> Result<()> {
        if to == LoanStatus::Disbursed && ctx.amount_funded < ctx.amount_requested {
            return Err(LendingError::PrematureDisbursement {
                funded: ctx.amount_funded,
                requested: ctx.amount_requested,
            });
        }

        let edge = Self::edge(from, to)
            .filter(|e| e.kind == kind)
            .ok_or(LendingError::IllegalTransition { from, to })?;

        let guard_holds = match edge.to {
            LoanStatus::Funding => {
                ctx.amount_funded.is_positive() && ctx.amount_funded <= ctx.amount_requested
            }
            LoanStatus::Disbursed => ctx.amount_funded == ctx.amount_requested,
            LoanStatus::Closed => ctx.all_installments_paid,
            _ => true,
        };

        if guard_holds {
            Ok(())
        } else {
            Err(LendingError::IllegalTransition { from, to })
        }
    }
}
