//! Property-based tests for the continuation and effect machinery.
//!
//! Uses proptest to generate random inputs and verify the algebraic laws
//! and protocol invariants hold.

use delimit::error::{run_error, throw};
use delimit::state::{get, put, run_state, run_state_expr, Get, Put};
use delimit::writer::{run_writer, tell};
use delimit::{pure, reflect, reify, Cont, Either, Expr};
use proptest::prelude::*;

/// Strategy for small arithmetic inputs that cannot overflow under the
/// transformations the tests apply.
fn small_int() -> impl Strategy<Value = i64> {
    -10_000i64..10_000
}

proptest! {
    /// Monad left identity: bind(of(a), f) == f(a)
    #[test]
    fn cont_left_identity(a in small_int(), add in small_int()) {
        let f = move |x: i64| Cont::<i64, i64>::of(x + add);
        let lhs = Cont::<i64, i64>::of(a).bind(f);
        prop_assert_eq!(lhs.run(), f(a).run());
    }

    /// Monad right identity: bind(m, of) == m
    #[test]
    fn cont_right_identity(a in small_int()) {
        let m = Cont::<i64, i64>::of(a);
        prop_assert_eq!(m.clone().bind(Cont::of).run(), m.run());
    }

    /// Monad associativity: bind(bind(m, f), g) == bind(m, x -> bind(f(x), g))
    #[test]
    fn cont_associativity(a in small_int(), add in small_int(), mul in -100i64..100) {
        let f = move |x: i64| Cont::<i64, i64>::of(x + add);
        let g = move |x: i64| Cont::<i64, i64>::of(x * mul);
        let m = Cont::<i64, i64>::of(a);
        let lhs = m.clone().bind(f).bind(g);
        let rhs = m.bind(move |x| f(x).bind(g));
        prop_assert_eq!(lhs.run(), rhs.run());
    }

    /// Functor identity and composition for map.
    #[test]
    fn cont_functor_laws(a in small_int(), add in small_int(), mul in -100i64..100) {
        prop_assert_eq!(Cont::<i64, i64>::of(a).map(|x| x).run(), a);
        let f = move |x: i64| x + add;
        let g = move |x: i64| x * mul;
        let lhs = Cont::<i64, i64>::of(a).map(f).map(g);
        let rhs = Cont::<i64, i64>::of(a).map(move |x| g(f(x)));
        prop_assert_eq!(lhs.run(), rhs.run());
    }

    /// The same monad laws hold in the frame representation.
    #[test]
    fn expr_monad_laws(a in small_int(), add in small_int(), mul in -100i64..100) {
        let f = move |x: i64| Expr::of(x + add);
        let g = move |x: i64| Expr::of(x * mul);
        prop_assert_eq!(Expr::of(a).bind(f).run_pure(), f(a).run_pure());
        prop_assert_eq!(Expr::of(a).bind(Expr::of).run_pure(), a);
        let lhs = Expr::of(a).bind(f).bind(g).run_pure();
        let rhs = Expr::of(a).bind(move |x| f(x).bind(g)).run_pure();
        prop_assert_eq!(lhs, rhs);
    }

    /// Functor laws for the frame representation.
    #[test]
    fn expr_functor_laws(a in small_int(), add in small_int(), mul in -100i64..100) {
        prop_assert_eq!(Expr::of(a).map(|x| x).run_pure(), a);
        let f = move |x: i64| x + add;
        let g = move |x: i64| x * mul;
        let lhs = Expr::of(a).map(f).map(g).run_pure();
        let rhs = Expr::of(a).map(move |x| g(f(x))).run_pure();
        prop_assert_eq!(lhs, rhs);
    }

    /// Both representations and both bridge directions agree on a
    /// stateful program: let s = get in put(f(s)); get
    #[test]
    fn bridge_round_trip_state(initial in small_int(), add in small_int()) {
        let cont_program = move || get::<i64>().bind(move |s| put(s + add).then(get::<i64>()));
        let expr_program = move || {
            Expr::perform(Get::<i64>::new())
                .bind(move |s| Expr::perform(Put::new(s + add)).then(Expr::perform(Get::<i64>::new())))
        };
        let expected = (initial + add, initial + add);

        prop_assert_eq!(run_state(initial, cont_program()), expected);
        prop_assert_eq!(run_state_expr(initial, expr_program()), expected);
        // reify: Cont -> Expr
        prop_assert_eq!(run_state_expr(initial, reify(cont_program())), expected);
        // reflect: Expr -> Cont
        prop_assert_eq!(run_state(initial, reflect(expr_program())), expected);
        // full round trips
        prop_assert_eq!(run_state(initial, reflect(reify(cont_program()))), expected);
        prop_assert_eq!(run_state_expr(initial, reify(reflect(expr_program()))), expected);
    }

    /// Writer output is delivered in textual order through every runner.
    #[test]
    fn writer_order_deterministic(values in prop::collection::vec(small_int(), 0..20)) {
        let vals = values.clone();
        let mut m = pure(0i64);
        for v in vals {
            m = m.then(tell(v)).then(pure(v));
        }
        let (_, output) = run_writer::<i64, i64>(m);
        prop_assert_eq!(output, values);
    }

    /// Errors thrown early suppress later effects; the Left value is the
    /// thrown error.
    #[test]
    fn throw_short_circuits(e in small_int(), unused in small_int()) {
        let m = throw::<i64, i64>(e).map(move |v: i64| v + unused);
        prop_assert_eq!(run_error::<i64, i64>(m), Either::Left(e));
    }

    /// Frame evaluation is total for chains of arbitrary (bounded) depth
    /// and the pools stay balanced afterwards.
    #[test]
    fn evaluation_total_and_pools_balanced(depth in 1usize..2_000) {
        let before = delimit::pool::stats();
        let mut e = Expr::perform(Get::<i64>::new());
        for _ in 0..depth {
            e = e.bind(|a| Expr::of(a + 1));
        }
        let (result, _) = run_state_expr(0i64, e);
        prop_assert_eq!(result, depth as i64);
        let after = delimit::pool::stats();
        prop_assert_eq!(after.outstanding(), before.outstanding());
    }

    /// For any suspension, exactly one resume attempt succeeds.
    #[test]
    fn suspension_affine(reply in small_int()) {
        let s = delimit::step(get::<i64>()).pending().expect("suspension");
        prop_assert!(s.try_resume(reply).is_some());
        prop_assert!(s.try_resume(reply).is_none());
        prop_assert!(s.try_resume(reply).is_none());
    }
}

mod stress_tests {
    use delimit::once;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// N concurrent resume attempts on one affine continuation: exactly
    /// one wins, regardless of interleaving.
    #[test]
    fn stress_affine_single_winner() {
        const NUM_THREADS: usize = 8;
        const ITERATIONS: usize = 200;

        fn ident(x: usize) -> usize {
            x
        }

        for _ in 0..ITERATIONS {
            let k = Arc::new(once(ident as fn(usize) -> usize));
            let wins = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..NUM_THREADS)
                .map(|i| {
                    let k = Arc::clone(&k);
                    let wins = Arc::clone(&wins);
                    thread::spawn(move || {
                        if k.try_resume(i).is_some() {
                            wins.fetch_add(1, Ordering::Relaxed);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().expect("attempt thread panicked");
            }
            assert_eq!(wins.load(Ordering::Relaxed), 1);
        }
    }

    /// Discard racing resume attempts: still at most one success.
    #[test]
    fn stress_affine_discard_race() {
        const NUM_THREADS: usize = 4;
        const ITERATIONS: usize = 200;

        fn ident(x: usize) -> usize {
            x
        }

        for _ in 0..ITERATIONS {
            let k = Arc::new(once(ident as fn(usize) -> usize));
            let wins = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..NUM_THREADS)
                .map(|i| {
                    let k = Arc::clone(&k);
                    let wins = Arc::clone(&wins);
                    thread::spawn(move || {
                        if i == 0 {
                            k.discard();
                        } else if k.try_resume(i).is_some() {
                            wins.fetch_add(1, Ordering::Relaxed);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().expect("attempt thread panicked");
            }
            assert!(wins.load(Ordering::Relaxed) <= 1);
        }
    }
}
