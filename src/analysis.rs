//! The fixpoint driver.
//!
//! [`Analysis::run_from`] seeds the entry point and then evaluates pending program
//! points until no state changes any more. Code is decoded when it is first reached.
//!
//! ```text
//! bootstrap --> steady (worklist not empty) --> drained
//!                  |
//!                  +--> failed / cancelled (partial results kept)
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::address::{Address, Transition};
use crate::binary::Binary;
use crate::callstring::{CallString, ProgramCtx};
use crate::code_cache::BinaryCodeCache;
use crate::config::AnalysisConfig;
use crate::disassembler::Disassembler;
use crate::environment::Environment;
use crate::error::{AnalysisError, ErrorKind, EvalError, Result};
use crate::evaluator::Evaluator;
use crate::flows::{FlowKind, Successor};
use crate::root::RootDomain;
use crate::rreil::Stmt;
use crate::state_space::StateSpace;
use crate::transitions::TransitionSystem;
use crate::warnings::{Warning, WarningsMap};
use crate::worklist::Worklist;

/// Cooperative cancellation flag, polled once per iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Region name for a segment: `.data` becomes `_data`.
pub fn region_name(segment: &str) -> String {
    segment.replace(['.', '-'], "_")
}

pub struct Analysis<D> {
    config: AnalysisConfig,
    env: Environment<D>,
    code: BinaryCodeCache,
    initial: D,
    state_space: StateSpace<D>,
    transitions: TransitionSystem,
    worklist: Worklist,
    token: CancellationToken,
    canary: Option<u64>,
    entry: Option<ProgramCtx>,
}

impl<D: RootDomain> Analysis<D> {
    pub fn new(
        binary: Binary,
        disassembler: impl Disassembler + 'static,
        initial: D,
        env: Environment<D>,
        config: AnalysisConfig,
    ) -> Self {
        let code = BinaryCodeCache::new(binary, Box::new(disassembler), config.disassemble_block_wise);
        Analysis {
            worklist: Worklist::new(config.process_addresses_in_order),
            config,
            env,
            code,
            initial,
            state_space: StateSpace::new(),
            transitions: TransitionSystem::new(),
            token: CancellationToken::new(),
            canary: None,
            entry: None,
        }
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyzes everything reachable from `start`.
    ///
    /// On failure the states and warnings computed so far stay available.
    pub fn run_from(&mut self, start: u64) -> Result<()> {
        info!("analysis from {:#x}", start);
        let entry = self.bootstrap(start);
        self.entry = Some(entry);
        while let Some(ctx) = self.worklist.dequeue() {
            if self.token.is_cancelled() {
                info!("analysis cancelled at {}", ctx);
                self.worklist.enqueue(ctx.clone());
                return Err(AnalysisError::new(ctx, None, ErrorKind::Cancelled));
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.step(&ctx)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("{}", e);
                    return Err(e);
                }
                Err(payload) => {
                    let message = panic_message(payload);
                    let stmt = self.code.rreil().get(ctx.address).map(Stmt::to_string);
                    self.state_space.warnings_mut().add(&ctx, [Warning::Error {
                        message: message.clone(),
                    }]);
                    return Err(AnalysisError::new(ctx, stmt, ErrorKind::Panicked(message)));
                }
            }
        }
        info!(
            "analysis done: {} points, {} instructions, {} warnings",
            self.state_space.len(),
            self.code.len(),
            self.state_space.warnings().count()
        );
        Ok(())
    }

    fn bootstrap(&mut self, start: u64) -> ProgramCtx {
        let mut state = self.initial.clone();
        if let Some(platform) = &self.env.platform {
            state = platform.bootstrap(state, start);
        }
        for segment in self.code.binary().segments() {
            debug!(
                "region {} at {:#x}, {} bytes, {}",
                segment.name, segment.address, segment.size, segment.permissions
            );
            state = state.introduce_region(&region_name(&segment.name), segment);
        }
        if let Some(abi) = &self.env.abi {
            state = abi.write_start_canary(start, start, state);
            self.canary = Some(start);
        }
        let start = Address::native(start);
        let call_string = CallString::with_bound(self.config.call_string_bound).push(Transition::new(Address::ZERO, start));
        let entry = ProgramCtx::new(call_string, start);
        self.transitions.add_entry(&entry);
        self.state_space.seed(&entry, state);
        self.worklist.enqueue(entry.clone());
        entry
    }

    /// One iteration: evaluate the statement at `ctx` and propagate its successors.
    fn step(&mut self, ctx: &ProgramCtx) -> Result<()> {
        let Some(state) = self.state_space.get(ctx).cloned() else {
            return Ok(());
        };
        let stmt = self
            .code
            .stmt(ctx.address)
            .map_err(|e| AnalysisError::new(ctx.clone(), None, e))?;
        let follow = self.code.follow(ctx.address);
        debug!("{}: {}", ctx, stmt);
        self.env.notify_evaluating(ctx, &stmt, &state);

        let flows = Evaluator::new(&self.env, &self.config, self.canary).eval(ctx, &stmt, follow, &state);
        let flows = match flows {
            Ok(flows) => flows,
            Err(e) => {
                self.state_space.warnings_mut().add(ctx, [Warning::Error { message: e.to_string() }]);
                return Err(AnalysisError::new(ctx.clone(), Some(stmt.to_string()), e));
            }
        };

        let mut changed_points = Vec::new();
        for succ in flows {
            let kind = succ.kind;
            let Some(to) = self.classify(ctx, &stmt, &succ)? else {
                continue;
            };
            if self.config.ignore_unknown_jump_targets {
                if let Err(e) = self.code.ensure(to.address.base()) {
                    self.state_space.warnings_mut().add(ctx, [Warning::DroppedSuccessor {
                        target: to.address.base(),
                        reason: e.to_string(),
                    }]);
                    continue;
                }
            }
            if kind == FlowKind::Call {
                self.transitions.add_call(ctx, &to, follow);
            } else {
                self.transitions.add(kind, ctx, &to);
            }
            let changed = self
                .state_space
                .update(ctx, kind, &to, succ.state, self.config.use_widening);
            self.env.notify_successor(ctx, kind, &to, changed);
            if changed {
                changed_points.push(to);
            }
        }
        self.worklist.enqueue_all(changed_points);
        Ok(())
    }

    /// The program point a successor leads to, or `None` if the path ends.
    fn classify(&mut self, ctx: &ProgramCtx, stmt: &Stmt, succ: &Successor<D>) -> Result<Option<ProgramCtx>> {
        let warnings = succ.state.warnings().iter().cloned();
        let target = match (succ.kind, succ.target) {
            (FlowKind::Halt, _) => {
                debug!("{}: halt", ctx);
                self.state_space
                    .warnings_mut()
                    .add(ctx, warnings.chain([Warning::Halted]));
                return Ok(None);
            }
            (FlowKind::Error, _) => {
                let message = succ
                    .state
                    .warnings()
                    .iter()
                    .find_map(|w| match w {
                        Warning::Error { message } => Some(message.clone()),
                        _ => None,
                    })
                    .unwrap_or_else(|| "error successor".to_string());
                self.state_space.warnings_mut().add(ctx, warnings);
                let e = EvalError::ErrorFlow {
                    address: ctx.address,
                    message,
                };
                return Err(AnalysisError::new(ctx.clone(), Some(stmt.to_string()), e));
            }
            (_, None) => return Ok(None),
            (_, Some(target)) => target,
        };
        let to = match succ.kind {
            FlowKind::Call => {
                let call_string = ctx.call_string.push(Transition::new(ctx.address, target));
                ProgramCtx::new(call_string, target)
            }
            FlowKind::Return => match ctx.call_string.pop() {
                Some(call_string) => ProgramCtx::new(call_string, target),
                None => {
                    debug!("{}: return from the root call string", ctx);
                    self.state_space.warnings_mut().add(ctx, warnings);
                    return Ok(None);
                }
            },
            _ => ctx.with_address(target),
        };
        debug!("{} --{}--> {}", ctx, succ.kind, to);
        Ok(Some(to))
    }

    /// The entry point of the last run.
    pub fn entry(&self) -> Option<&ProgramCtx> {
        self.entry.as_ref()
    }

    pub fn get_state(&self, call_string: &CallString, address: Address) -> Option<&D> {
        self.state_space.get_at(call_string, address)
    }

    pub fn warnings(&self) -> &WarningsMap {
        self.state_space.warnings()
    }

    pub fn transition_system(&self) -> &TransitionSystem {
        &self.transitions
    }

    pub fn state_space(&self) -> &StateSpace<D> {
        &self.state_space
    }

    pub fn code_cache(&self) -> &BinaryCodeCache {
        &self.code
    }

    /// Points still waiting to be evaluated, non-zero only after a failed run.
    pub fn pending(&self) -> usize {
        self.worklist.len()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with unknown payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::affine::Affine;
    use crate::binary::{Permissions, Segment};
    use crate::disassembler::LiftedProgram;
    use crate::domain::testing::Intervals;
    use crate::environment::{Abi, Callbacks, Observer};
    use crate::flows::Flows;
    use crate::range::Range;
    use crate::root::Root;
    use crate::rreil::{BranchKind, Cmp, CmpOp, Lin, Rhs, Rvar};
    use test_log::test;

    type State = Root<Affine<Intervals>>;

    fn top() -> State {
        Root::new(Affine::new(Intervals::new()))
    }

    fn r(name: &str) -> Rvar {
        Rvar::new(name, 32)
    }

    fn analysis(program: LiftedProgram, config: AnalysisConfig) -> Analysis<State> {
        Analysis::new(Binary::default(), program, top(), Environment::new(), config)
    }

    fn entry_cs(config: &AnalysisConfig, start: u64) -> CallString {
        CallString::with_bound(config.call_string_bound).push(Transition::new(Address::ZERO, Address::native(start)))
    }

    fn ret(var: &Rvar) -> Stmt {
        Stmt::Branch {
            kind: BranchKind::Return,
            target: Lin::var(var),
        }
    }

    #[test]
    fn test_straight_line() {
        let a = r("a");
        let program = LiftedProgram::new()
            .with(0, "mov", vec![Stmt::assign(&a, Lin::lit(1))])
            .with(1, "inc", vec![Stmt::assign(&a, Lin::var(&a).offset(1))])
            .with(2, "hlt", vec![Stmt::halt()]);
        let config = AnalysisConfig::default();
        let mut analysis = analysis(program, config.clone());
        analysis.run_from(0).unwrap();
        assert_eq!(analysis.state_space().len(), 3);
        assert!(analysis.transition_system().call().is_empty());
        assert!(analysis.transition_system().ret().is_empty());
        assert_eq!(analysis.pending(), 0);
        let cs = entry_cs(&config, 0);
        let last = analysis.get_state(&cs, Address::native(2)).unwrap();
        assert_eq!(last.register(&a), Range::constant(2));
        let halt = ProgramCtx::new(cs, Address::native(2));
        assert_eq!(analysis.warnings().get(&halt), &[Warning::Halted]);
    }

    #[test]
    fn test_block_wise_matches_instruction_wise() {
        let a = r("a");
        let program = LiftedProgram::new()
            .with(0, "mov", vec![Stmt::assign(&a, Lin::lit(1))])
            .with(1, "inc", vec![Stmt::assign(&a, Lin::var(&a).offset(1))])
            .with(2, "hlt", vec![Stmt::halt()])
            .with(3, "nop", vec![Stmt::Nop]);
        let mut analysis = analysis(program, AnalysisConfig::default().with_block_wise(true));
        analysis.run_from(0).unwrap();
        assert_eq!(analysis.state_space().len(), 3);
        assert_eq!(analysis.code_cache().len(), 3);
    }

    #[test]
    fn test_both_branch_arms_reached() {
        let x = r("x");
        let program = LiftedProgram::new()
            .with(
                0,
                "jz",
                vec![
                    Stmt::Assign {
                        lhs: x.clone(),
                        rhs: Rhs::Arbitrary,
                    },
                    Stmt::BranchToNative {
                        cond: Cmp::new(CmpOp::Eq, Lin::var(&x), Lin::lit(0)),
                        target: Lin::lit(5),
                    },
                ],
            )
            .with(1, "hlt", vec![Stmt::halt()])
            .with(5, "hlt", vec![Stmt::halt()]);
        let config = AnalysisConfig::default();
        let mut analysis = analysis(program, config.clone());
        analysis.run_from(0).unwrap();
        let cs = entry_cs(&config, 0);
        let taken = analysis.get_state(&cs, Address::native(5)).unwrap();
        assert_eq!(taken.register(&x), Range::constant(0));
        let fallthrough = analysis.get_state(&cs, Address::native(1)).unwrap();
        assert_eq!(fallthrough.register(&x), Range::finite(1, u32::MAX));
    }

    #[test]
    fn test_call_and_return() {
        let ra = r("ra");
        let program = LiftedProgram::new()
            .with(0, "call", vec![Stmt::assign(&ra, Lin::lit(1)), Stmt::call(0x10)])
            .with(1, "hlt", vec![Stmt::halt()])
            .with(0x10, "ret", vec![ret(&ra)]);
        let config = AnalysisConfig::default();
        let mut analysis = analysis(program, config.clone());
        analysis.run_from(0).unwrap();

        let cs = entry_cs(&config, 0);
        let call_site = ProgramCtx::new(cs.clone(), Address::new(0, 1));
        let callee_cs = cs.push(Transition::new(Address::new(0, 1), Address::native(0x10)));
        let callee = ProgramCtx::new(callee_cs, Address::native(0x10));
        let ts = analysis.transition_system();
        assert!(ts.call().contains(&(call_site, callee.clone())));
        let return_site = ProgramCtx::new(cs, Address::native(1));
        assert!(ts.ret().contains(&(callee, return_site.clone())));
        assert!(analysis.state_space().contains(&return_site));
        assert_eq!(ts.call_sites(Address::native(0x10)).count(), 1);
        assert_eq!(
            ts.return_sites(Address::native(0x10)).collect::<Vec<_>>(),
            vec![Address::native(1)]
        );
        assert_eq!(
            ts.flat_successors(Address::native(0x10)).collect::<Vec<_>>(),
            vec![Address::native(1)]
        );
    }

    #[test]
    fn test_k_limited_recursion_merges() {
        let program = LiftedProgram::new()
            .with(0, "call", vec![Stmt::call(0x10)])
            .with(0x10, "call", vec![Stmt::call(0x10)]);
        let config = AnalysisConfig::default().with_call_string_bound(2);
        let mut analysis = analysis(program, config);
        analysis.run_from(0).unwrap();

        let self_call = Transition::new(Address::native(0x10), Address::native(0x10));
        let second = CallString::bounded(2)
            .push(Transition::new(Address::native(0), Address::native(0x10)))
            .push(self_call);
        let third = second.push(self_call);
        assert_eq!(third, CallString::bounded(2).push(self_call).push(self_call));
        assert_eq!(third.push(self_call), third);
        let point = ProgramCtx::new(third, Address::native(0x10));
        assert!(analysis.state_space().contains(&point));
        assert!(analysis.state_space().iterations(&point) >= 2);
        assert!(analysis.transition_system().call().contains(&(point.clone(), point)));
        // entry and both collapsed contexts of the callee
        assert_eq!(analysis.state_space().len(), 4);
    }

    #[test]
    fn test_loop_terminates_with_widening() {
        let i = r("i");
        let program = LiftedProgram::new()
            .with(0, "mov", vec![Stmt::assign(&i, Lin::lit(0))])
            .with(1, "inc", vec![Stmt::assign(&i, Lin::var(&i).offset(1))])
            .with(2, "jmp", vec![Stmt::jump(1)]);
        let config = AnalysisConfig::default();
        let mut analysis = analysis(program, config.clone());
        analysis.run_from(0).unwrap();
        let cs = entry_cs(&config, 0);
        let head = analysis.get_state(&cs, Address::native(1)).unwrap();
        assert!(head.register(&i).contains(&1_000_000.into()));
        assert!(analysis.state_space().max_iterations() < 10);
    }

    #[test]
    fn test_bounded_loop_keeps_exit_bound() {
        let i = r("i");
        let program = LiftedProgram::new()
            .with(0, "mov", vec![Stmt::assign(&i, Lin::lit(0))])
            .with(
                1,
                "jae",
                vec![Stmt::BranchToNative {
                    cond: Cmp::new(CmpOp::LeUnsigned, Lin::lit(10), Lin::var(&i)),
                    target: Lin::lit(4),
                }],
            )
            .with(2, "inc", vec![Stmt::assign(&i, Lin::var(&i).offset(1))])
            .with(3, "jmp", vec![Stmt::jump(1)])
            .with(4, "hlt", vec![Stmt::halt()]);
        let config = AnalysisConfig::default();
        let mut analysis = analysis(program, config.clone());
        analysis.run_from(0).unwrap();
        let cs = entry_cs(&config, 0);
        let body = analysis.get_state(&cs, Address::native(2)).unwrap();
        assert_eq!(body.register(&i), Range::finite(0, 9));
        let exit = analysis.get_state(&cs, Address::native(4)).unwrap();
        assert!(exit.register(&i).contains(&10.into()));
    }

    struct CancelAfter {
        token: CancellationToken,
        remaining: Rc<Cell<usize>>,
    }

    impl Observer<State> for CancelAfter {
        fn evaluating(&mut self, _ctx: &ProgramCtx, _stmt: &Stmt, _state: &State) {
            let n = self.remaining.get().saturating_sub(1);
            self.remaining.set(n);
            if n == 0 {
                self.token.cancel();
            }
        }
    }

    #[test]
    fn test_cancellation_keeps_partial_results() {
        let a = r("a");
        let program = LiftedProgram::new()
            .with(0, "mov", vec![Stmt::assign(&a, Lin::lit(1))])
            .with(
                1,
                "assert",
                vec![Stmt::Assertion(Cmp::new(CmpOp::Eq, Lin::var(&r("b")), Lin::lit(0)))],
            )
            .with(2, "inc", vec![Stmt::assign(&a, Lin::var(&a).offset(1))])
            .with(3, "hlt", vec![Stmt::halt()]);
        let token = CancellationToken::new();
        let observer = CancelAfter {
            token: token.clone(),
            remaining: Rc::new(Cell::new(2)),
        };
        let env = Environment::new().with_observer(observer);
        let config = AnalysisConfig::default();
        let mut analysis =
            Analysis::new(Binary::default(), program, top(), env, config.clone()).with_cancellation_token(token);
        let err = analysis.run_from(0).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.ctx.address, Address::native(2));

        let cs = entry_cs(&config, 0);
        assert!(analysis.get_state(&cs, Address::native(2)).is_some());
        assert!(analysis.get_state(&cs, Address::native(3)).is_none());
        assert_eq!(analysis.warnings().count(), 1);
        assert_eq!(analysis.pending(), 1);
    }

    struct Crash;

    impl Observer<State> for Crash {
        fn evaluating(&mut self, ctx: &ProgramCtx, _stmt: &Stmt, _state: &State) {
            if ctx.address == Address::native(1) {
                panic!("observer failed");
            }
        }
    }

    #[test]
    fn test_panic_is_wrapped() {
        let program = LiftedProgram::new()
            .with(0, "nop", vec![Stmt::Nop])
            .with(1, "hlt", vec![Stmt::halt()]);
        let env = Environment::new().with_observer(Crash);
        let mut analysis = Analysis::new(Binary::default(), program, top(), env, AnalysisConfig::default());
        let err = analysis.run_from(0).unwrap_err();
        assert!(matches!(&err.kind, ErrorKind::Panicked(m) if m == "observer failed"));
        assert_eq!(err.stmt.as_deref(), Some("prim halt()"));
        assert_eq!(analysis.state_space().len(), 2);
    }

    #[test]
    fn test_unknown_target() {
        let program = LiftedProgram::new().with(0, "jmp", vec![Stmt::jump(0x99)]);
        let mut strict = analysis(program.clone(), AnalysisConfig::default());
        let err = strict.run_from(0).unwrap_err();
        assert_eq!(err.ctx.address, Address::native(0x99));
        assert!(matches!(
            err.kind,
            ErrorKind::Eval(EvalError::Disassembly(_))
        ));

        let config = AnalysisConfig::default().with_ignore_unknown_jump_targets(true);
        let mut lenient = analysis(program, config.clone());
        lenient.run_from(0).unwrap();
        let ctx = ProgramCtx::new(entry_cs(&config, 0), Address::native(0));
        assert!(matches!(
            lenient.warnings().get(&ctx),
            [Warning::DroppedSuccessor { target: 0x99, .. }]
        ));
    }

    #[test]
    fn test_non_constant_target_is_fatal() {
        let t = r("t");
        let program = LiftedProgram::new().with(
            0,
            "jmp",
            vec![
                Stmt::Assign {
                    lhs: t.clone(),
                    rhs: Rhs::Arbitrary,
                },
                Stmt::BranchToNative {
                    cond: Cmp::new(CmpOp::Eq, Lin::lit(0), Lin::lit(0)),
                    target: Lin::var(&t),
                },
            ],
        );
        let mut analysis = analysis(program, AnalysisConfig::default());
        let err = analysis.run_from(0).unwrap_err();
        assert_eq!(err.ctx.address, Address::new(0, 1));
        assert!(matches!(
            err.kind,
            ErrorKind::Eval(EvalError::NonConstantTarget { .. })
        ));
        assert_eq!(analysis.warnings().count(), 1);
    }

    struct ReturnAddressInRa;

    impl Abi<State> for ReturnAddressInRa {
        fn write_start_canary(&self, _entry: u64, canary: u64, state: State) -> State {
            state.eval_assign(&r("ra"), &Rhs::Lin(Lin::lit(canary))).unwrap()
        }
    }

    #[test]
    fn test_return_to_canary_halts() {
        let ra = r("ra");
        let program = LiftedProgram::new()
            .with(0x40, "nop", vec![Stmt::Nop])
            .with(0x41, "ret", vec![ret(&ra)]);
        let env = Environment::new().with_abi(ReturnAddressInRa);
        let config = AnalysisConfig::default();
        let mut analysis = Analysis::new(Binary::default(), program, top(), env, config.clone());
        analysis.run_from(0x40).unwrap();
        assert!(analysis.transition_system().ret().is_empty());
        let ctx = ProgramCtx::new(entry_cs(&config, 0x40), Address::native(0x41));
        assert_eq!(analysis.warnings().get(&ctx), &[Warning::Halted]);
    }

    #[test]
    fn test_segments_become_regions() {
        let a = r("a");
        let binary = Binary::new(
            "a.out",
            vec![Segment::new(".data", 0x100, vec![5, 0, 0, 0], Permissions::RW)],
        );
        let program = LiftedProgram::new()
            .with(
                0,
                "load",
                vec![Stmt::Load {
                    lhs: a.clone(),
                    address: Lin::lit(0x100),
                }],
            )
            .with(1, "hlt", vec![Stmt::halt()]);
        let config = AnalysisConfig::default();
        let mut analysis = Analysis::new(binary, program, top(), Environment::new(), config.clone());
        analysis.run_from(0).unwrap();
        let state = analysis.get_state(&entry_cs(&config, 0), Address::native(1)).unwrap();
        assert_eq!(state.register(&a), Range::constant(5));
        assert_eq!(region_name(".got-plt"), "_got_plt");
    }

    #[test]
    fn test_fifo_order() {
        let a = r("a");
        let program = LiftedProgram::new()
            .with(0, "mov", vec![Stmt::assign(&a, Lin::lit(1))])
            .with(1, "hlt", vec![Stmt::halt()]);
        let mut analysis = analysis(program, AnalysisConfig::default().with_in_order(false));
        analysis.run_from(0).unwrap();
        assert_eq!(analysis.state_space().len(), 2);
    }

    fn branch_program(first: Vec<Stmt>, cond: Cmp) -> LiftedProgram {
        let mut stmts = first;
        stmts.push(Stmt::BranchToNative {
            cond,
            target: Lin::lit(5),
        });
        LiftedProgram::new()
            .with(0, "jcc", stmts)
            .with(1, "hlt", vec![Stmt::halt()])
            .with(5, "hlt", vec![Stmt::halt()])
    }

    #[test]
    fn test_signed_branch_on_unknown_reaches_both_arms() {
        let x = r("x");
        let program = branch_program(
            vec![Stmt::Assign {
                lhs: x.clone(),
                rhs: Rhs::Arbitrary,
            }],
            Cmp::new(CmpOp::LtSigned, Lin::var(&x), Lin::lit(0)),
        );
        let config = AnalysisConfig::default();
        let mut analysis = analysis(program, config.clone());
        analysis.run_from(0).unwrap();
        let cs = entry_cs(&config, 0);
        let taken = analysis.get_state(&cs, Address::native(5)).unwrap();
        assert!(taken.register(&x).contains(&0x8000_0000u32.into()));
        assert!(analysis.get_state(&cs, Address::native(1)).is_some());
    }

    #[test]
    fn test_overflow_wraps_to_zero() {
        let x = r("x");
        let program = branch_program(
            vec![
                Stmt::assign(&x, Lin::lit(u32::MAX)),
                Stmt::assign(&x, Lin::var(&x).offset(1)),
            ],
            Cmp::new(CmpOp::Eq, Lin::var(&x), Lin::lit(0)),
        );
        let config = AnalysisConfig::default();
        let mut analysis = analysis(program, config.clone());
        analysis.run_from(0).unwrap();
        let cs = entry_cs(&config, 0);
        let taken = analysis.get_state(&cs, Address::native(5)).unwrap();
        assert_eq!(taken.register(&x), Range::constant(0));
        assert!(analysis.get_state(&cs, Address::native(1)).is_none());
    }

    #[test]
    fn test_loop_body_of_several_statements_keeps_bound() {
        let (i, j) = (r("i"), r("j"));
        let program = LiftedProgram::new()
            .with(0, "mov", vec![Stmt::assign(&i, Lin::lit(0))])
            .with(
                1,
                "jae",
                vec![Stmt::BranchToNative {
                    cond: Cmp::new(CmpOp::LeUnsigned, Lin::lit(10), Lin::var(&i)),
                    target: Lin::lit(4),
                }],
            )
            .with(
                2,
                "inc",
                vec![
                    Stmt::assign(&i, Lin::var(&i).offset(1)),
                    Stmt::assign(&j, Lin::var(&i)),
                ],
            )
            .with(3, "jmp", vec![Stmt::jump(1)])
            .with(4, "hlt", vec![Stmt::halt()]);
        let config = AnalysisConfig::default();
        let mut analysis = analysis(program, config.clone());
        analysis.run_from(0).unwrap();
        let cs = entry_cs(&config, 0);
        let second = analysis.get_state(&cs, Address::new(2, 1)).unwrap();
        assert_eq!(second.register(&i), Range::finite(1, 10));
        let latch = analysis.get_state(&cs, Address::native(3)).unwrap();
        assert_eq!(latch.register(&j), Range::finite(1, 10));
    }

    struct UnbalancedStack;

    impl Callbacks<State> for UnbalancedStack {
        fn try_callback(&self, kind: FlowKind, target: u64, state: &State, _ctx: &ProgramCtx) -> Option<Flows<State>> {
            (kind == FlowKind::Return && target == 0x20).then(|| {
                let state = state.with_warning(Warning::AssertionMayFail {
                    assertion: "sp == 0".to_string(),
                });
                Flows::single(Successor::new(kind, Address::native(target), state))
            })
        }
    }

    #[test]
    fn test_return_from_root_keeps_warnings() {
        let (ra, rb) = (r("ra"), r("rb"));
        let program = LiftedProgram::new()
            .with(0, "ret", vec![Stmt::assign(&ra, Lin::lit(1)), ret(&ra)])
            .with(1, "ret", vec![Stmt::assign(&rb, Lin::lit(0x20)), ret(&rb)]);
        let env = Environment::new().with_callbacks(UnbalancedStack);
        let config = AnalysisConfig::default();
        let mut analysis = Analysis::new(Binary::default(), program, top(), env, config.clone());
        analysis.run_from(0).unwrap();
        let root = entry_cs(&config, 0).pop().unwrap();
        let ctx = ProgramCtx::new(root, Address::new(1, 1));
        assert!(matches!(
            analysis.warnings().get(&ctx),
            [Warning::AssertionMayFail { .. }]
        ));
        assert!(analysis.transition_system().ret().iter().all(|(from, _)| from != &ctx));
    }
}
