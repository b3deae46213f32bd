//! Transfer function: one RREIL statement and a state in, successors out.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound::{Excluded, Unbounded};

use log::debug;
use num_traits::ToPrimitive;

use crate::address::Address;
use crate::callstring::ProgramCtx;
use crate::config::AnalysisConfig;
use crate::environment::{Environment, FunctionDefinition};
use crate::error::{EvalError, Infeasible};
use crate::flows::{FlowKind, Flows, Successor};
use crate::root::RootDomain;
use crate::rreil::{BranchKind, Cmp, Lin, Stmt};
use crate::warnings::Warning;

pub struct Evaluator<'a, D> {
    env: &'a Environment<D>,
    config: &'a AnalysisConfig,
    /// Return address planted for the entry procedure.
    canary: Option<u64>,
}

impl<'a, D: RootDomain> Evaluator<'a, D> {
    pub fn new(env: &'a Environment<D>, config: &'a AnalysisConfig, canary: Option<u64>) -> Self {
        Evaluator { env, config, canary }
    }

    /// Evaluates `stmt` at `ctx`. `follow` is where control falls through to.
    ///
    /// The result is empty only for an assignment, load or store on a dead path.
    pub fn eval(&self, ctx: &ProgramCtx, stmt: &Stmt, follow: Address, state: &D) -> Result<Flows<D>, EvalError> {
        let flows = self.dispatch(ctx, stmt, follow, state)?;
        if flows.is_empty() && !matches!(stmt, Stmt::Load { .. } | Stmt::Assign { .. } | Stmt::Store { .. }) {
            return Err(EvalError::NoSuccessors { address: ctx.address });
        }
        Ok(flows)
    }

    fn dispatch(&self, ctx: &ProgramCtx, stmt: &Stmt, follow: Address, state: &D) -> Result<Flows<D>, EvalError> {
        let address = ctx.address;
        match stmt {
            Stmt::Assign { lhs, rhs } => Ok(Self::live(address, follow, state.eval_assign(lhs, rhs))),
            Stmt::Load { lhs, address: a } => Ok(Self::live(address, follow, state.eval_load(lhs, a))),
            Stmt::Store { address: a, value, size } => Ok(Self::live(address, follow, state.eval_store(a, value, *size))),
            Stmt::Nop => Ok(Flows::next(follow, state.clone())),
            Stmt::Assertion(cmp) => Ok(Flows::next(follow, state.eval_assertion(cmp))),
            Stmt::BranchToRReil { cond, target } => {
                let (taken, not_taken) = self.split(address, cond, state)?;
                let mut flows = Flows::new();
                if let Some(s) = taken {
                    flows.push(Successor::new(FlowKind::Jump, *target, s));
                }
                if let Some(s) = not_taken {
                    flows.push(Successor::new(FlowKind::Next, follow, s));
                }
                Ok(flows)
            }
            Stmt::BranchToNative { cond, target } => {
                let (taken, not_taken) = self.split(address, cond, state)?;
                let mut flows = Flows::new();
                if let Some(s) = not_taken {
                    flows.push(Successor::new(FlowKind::Next, follow, s));
                }
                if let Some(s) = taken {
                    let range = s.query_lin(target);
                    if !range.is_empty() {
                        let t = range
                            .as_constant()
                            .and_then(|c| c.to_u64())
                            .ok_or_else(|| EvalError::NonConstantTarget {
                                address,
                                target: range.clone(),
                            })?;
                        flows.extend(self.branch_to(ctx, FlowKind::Jump, t, s));
                    }
                }
                Ok(flows)
            }
            Stmt::Branch { kind, target } => self.eval_branch(ctx, *kind, target, state),
            Stmt::PrimOp { name, .. } if name == "halt" => Ok(Flows::single(Successor::halt(state.clone()))),
            Stmt::PrimOp { name, outs, ins } => Ok(match state.eval_primitive(name, outs, ins) {
                Ok(s) => Flows::next(follow, s),
                Err(_) => Flows::single(Successor::error(state.with_warning(Warning::Error {
                    message: format!("primitive `{}` has no feasible result", name),
                }))),
            }),
            Stmt::Native { name, outs, ins } => {
                let model = self
                    .env
                    .system_model
                    .as_ref()
                    .ok_or_else(|| EvalError::UnsupportedNative {
                        address,
                        name: name.clone(),
                    })?;
                let definitions = model.resolve(name, outs, ins, state);
                if definitions.is_empty() {
                    debug!("{}: native `{}` does not return", address, name);
                    return Ok(Flows::single(Successor::halt(state.clone())));
                }
                self.eval_native(ctx, &definitions, follow, state)
            }
        }
    }

    /// Falls through with `state`, or nowhere if the statement found the path dead.
    fn live(address: Address, follow: Address, state: Result<D, Infeasible>) -> Flows<D> {
        match state {
            Ok(s) => Flows::next(follow, s),
            Err(_) => {
                debug!("{}: dead path", address);
                Flows::new()
            }
        }
    }

    /// Evaluates both outcomes of a condition. Fails if neither is feasible.
    fn split(&self, address: Address, cond: &Cmp, state: &D) -> Result<(Option<D>, Option<D>), EvalError> {
        let taken = state.eval_cmp(cond).ok();
        let not_taken = state.eval_cmp(&cond.negate()).ok();
        if taken.is_none() && not_taken.is_none() {
            return Err(EvalError::BothBranchesInfeasible { address });
        }
        Ok((taken, not_taken))
    }

    fn eval_branch(&self, ctx: &ProgramCtx, kind: BranchKind, target: &Lin, state: &D) -> Result<Flows<D>, EvalError> {
        let kind = match kind {
            BranchKind::Jump => FlowKind::Jump,
            BranchKind::Call => FlowKind::Call,
            BranchKind::Return => FlowKind::Return,
        };
        let range = state.query_lin(target);
        if range.is_empty() {
            return Ok(Flows::new());
        }
        let values = range
            .values(self.config.max_target_enumeration)
            .ok_or(EvalError::UnresolvedBranch { address: ctx.address })?;
        let mut flows = Flows::new();
        for value in values {
            let Some(t) = value.to_u64() else {
                continue;
            };
            let restricted = if range.is_constant() {
                state.clone()
            } else {
                match state.restrict(target, &value) {
                    Ok(s) => s,
                    Err(_) => continue,
                }
            };
            if kind == FlowKind::Return && Some(t) == self.canary {
                debug!("{}: return to the start canary", ctx.address);
                flows.push(Successor::halt(restricted));
                continue;
            }
            flows.extend(self.branch_to(ctx, kind, t, restricted));
        }
        Ok(flows)
    }

    /// A branch to the native address `target`, unless a callback claims it.
    fn branch_to(&self, ctx: &ProgramCtx, kind: FlowKind, target: u64, state: D) -> Flows<D> {
        let state = match self.env.instruction_pointer() {
            Some(ip) => match state.move_instruction_pointer(&ip, &Lin::lit(target)) {
                Ok(s) => s,
                Err(_) => {
                    debug!("{}: {} to {:#x} on a dead path", ctx.address, kind, target);
                    return Flows::new();
                }
            },
            None => state,
        };
        if let Some(flows) = self.env.try_callbacks(kind, target, &state, ctx) {
            debug!("{}: {} to {:#x} handled by callback", ctx.address, kind, target);
            return flows;
        }
        Flows::single(Successor::new(kind, Address::native(target), state))
    }

    /// Runs each definition to its exits and joins the results.
    fn eval_native(
        &self,
        ctx: &ProgramCtx,
        definitions: &[FunctionDefinition],
        follow: Address,
        state: &D,
    ) -> Result<Flows<D>, EvalError> {
        let mut exit: Option<D> = None;
        let mut flows = Flows::new();
        for def in definitions {
            let (exits, others) = self.run_definition(ctx, def, state)?;
            for s in exits {
                exit = Some(match exit {
                    Some(e) => e.join(&s),
                    None => s,
                });
            }
            flows.extend(others);
        }
        let mut result = Flows::new();
        if let Some(s) = exit {
            // joins drop warnings, carry over the ones of the input
            let s = state.warnings().iter().fold(s, |s, w| s.with_warning(w.clone()));
            result.push(Successor::new(FlowKind::Next, follow, s));
        }
        result.extend(flows);
        if result.is_empty() {
            result.push(Successor::halt(state.clone()));
        }
        Ok(result)
    }

    /// Local fixpoint over the statements of one definition.
    ///
    /// Returns the states leaving the definition and the halting or failing successors.
    fn run_definition(&self, ctx: &ProgramCtx, def: &FunctionDefinition, state: &D) -> Result<(Vec<D>, Flows<D>), EvalError> {
        debug!("{}: running model of `{}`", ctx.address, def.name);
        let mut states: BTreeMap<Address, D> = BTreeMap::new();
        let mut worklist = VecDeque::from([def.entry]);
        states.insert(def.entry, state.clone());
        let mut exits = Vec::new();
        let mut others = Flows::new();
        while let Some(address) = worklist.pop_front() {
            let (Some(stmt), Some(current)) = (def.get(address), states.get(&address).cloned()) else {
                continue;
            };
            let follow = def
                .stmts
                .range((Excluded(address), Unbounded))
                .next()
                .map(|(a, _)| *a)
                .unwrap_or_else(|| address.next_base());
            let local = ctx.with_address(address);
            for succ in self.eval(&local, stmt, follow, &current)? {
                let target = match succ.target {
                    Some(t) if succ.kind.is_local() && def.stmts.contains_key(&t) => t,
                    Some(_) => {
                        exits.push(succ.state);
                        continue;
                    }
                    None => {
                        others.push(succ);
                        continue;
                    }
                };
                let merged = match states.get(&target) {
                    None => Some(succ.state),
                    Some(old) if succ.state.subset_or_equal(old) => None,
                    Some(old) if self.config.use_widening && target <= address => Some(old.widen(&succ.state)),
                    Some(old) => Some(old.join(&succ.state)),
                };
                if let Some(merged) = merged {
                    states.insert(target, merged);
                    if !worklist.contains(&target) {
                        worklist.push_back(target);
                    }
                }
            }
        }
        Ok((exits, others))
    }
}
