//! Thread-per-stage execution.
//!
//! Every cycle has three rendezvous points:
//! - `start`: all stage threads and the driver begin the cycle
//! - `end`: fetch, execute, memory and writeback are done
//! - `decoded`: decode, which needs this cycle's execute and memory
//!   results for forwarding, is done
//!
//! The driver then runs the hazard unit and the latch on its own.
//! Stages share the same functions as the serial driver, so both
//! produce identical results.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Barrier;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread;

use super::finish_cycle;
use super::forward::ForwardSources;
use super::stages;
use super::Simulation;
use crate::cpu::CPUState;

/// Number of stage threads
const STAGES: usize = 5;

/// Locks ignoring poison; a panicking stage already aborts the scope
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn run(sim: &mut Simulation) {
    let CPUState { pc, regs, nzcv, status } = &mut sim.cpu;
    let history = &mut sim.history;
    let cycle_max = sim.policy.cycle_max;

    // Skip spawning threads if there is nothing to do
    if status.is_terminal() || history.cycle_count >= cycle_max {
        return;
    }

    let pipes = Mutex::new(&mut sim.pipes);
    let port = Mutex::new(&mut sim.port);
    let regs = Mutex::new(regs);
    let nzcv = Mutex::new(nzcv);

    let start = Barrier::new(STAGES + 1);
    let end = Barrier::new(STAGES + 1);
    let decoded = Barrier::new(2);
    let running = AtomicBool::new(true);

    // Waits for the next cycle; false once the driver is done
    let next_cycle = || {
        start.wait();
        running.load(Ordering::Acquire)
    };

    thread::scope(|s| {
        s.spawn(|| {
            while next_cycle() {
                let (f, x_out, m_out) = {
                    let p = lock(&pipes);
                    (*p.f.out(), *p.x.out(), *p.m.out())
                };
                let (f_in, d_in) = stages::fetch(&f, &x_out, &m_out, &lock(&port));
                {
                    let mut p = lock(&pipes);
                    p.f.stage(f_in);
                    p.d.stage(d_in);
                }
                end.wait();
            }
        });

        s.spawn(|| {
            while next_cycle() {
                end.wait();
                let (d, fwd) = {
                    let p = lock(&pipes);
                    let fwd = ForwardSources::collect(
                        p.x.out(),
                        p.m.input(),
                        p.m.out(),
                        p.w.input(),
                        p.w.out(),
                    );
                    (*p.d.out(), fwd)
                };
                let x_in = stages::decode(&d, &lock(&regs), &fwd);
                lock(&pipes).x.stage(x_in);
                decoded.wait();
            }
        });

        s.spawn(|| {
            while next_cycle() {
                let x = *lock(&pipes).x.out();
                let m_in = stages::execute(&x, &mut lock(&nzcv));
                lock(&pipes).m.stage(m_in);
                end.wait();
            }
        });

        s.spawn(|| {
            while next_cycle() {
                let m = *lock(&pipes).m.out();
                let w_in = stages::memory(&m, &mut lock(&port));
                lock(&pipes).w.stage(w_in);
                end.wait();
            }
        });

        s.spawn(|| {
            while next_cycle() {
                let w = *lock(&pipes).w.out();
                stages::writeback(&w, &mut lock(&regs));
                end.wait();
            }
        });

        loop {
            start.wait();
            end.wait();
            decoded.wait();

            let in_flight = lock(&port).in_flight();
            finish_cycle(&mut lock(&pipes), pc, status, history, in_flight);

            if status.is_terminal() || history.cycle_count >= cycle_max {
                break;
            }
        }

        // Release the stage threads so they observe the stop flag
        running.store(false, Ordering::Release);
        start.wait();
    });
}
