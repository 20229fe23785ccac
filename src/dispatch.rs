//! Sandboxed, deterministic collector dispatch.
//!
//! Collectors are pluggable visitors extracting one category of structure
//! each (links, tables, headings, ...). The engine runs one forward pass
//! over the canonical tokens and routes each token to the collectors
//! registered for its exact type, in registration order. A collector can
//! declare ancestor types it must not fire inside; those sets compile to
//! bitmasks at registration, and the pass maintains a single integer mask
//! of currently-open watched types, so the ancestor check is one AND per
//! candidate regardless of nesting depth.
//!
//! Collector code is untrusted: every callback runs under the deadline
//! utility and a panic trap. A misbehaving collector is recorded in the
//! pass failure log and dispatch continues; only strict mode escalates
//! the first failure into an error. Routing and mask state are not
//! reentrant-safe, so invoking dispatch while a pass is in progress fails
//! immediately.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::deadline;
use crate::error::{DispatchError, FailureKind};
use crate::index::StructureIndex;
use crate::token::CanonicalToken;

/// Capacity of the shared type-to-bit table.
const BIT_CAPACITY: usize = 64;

/// A pluggable, sandboxed visitor extracting one category of structure.
pub trait Collector {
    /// Stable identity. Registering the same identity twice is a no-op.
    fn name(&self) -> &str;

    /// Token types this collector wants to visit.
    fn interests(&self) -> Vec<String>;

    /// Ancestor types inside which this collector must not fire.
    fn ignore_inside(&self) -> Vec<String> {
        Vec::new()
    }

    /// Optional per-token predicate, checked after the ancestor mask.
    fn accepts(&self, _token: &CanonicalToken) -> bool {
        true
    }

    /// Readiness check, consulted per candidate token.
    fn ready(&self) -> bool {
        true
    }

    /// Visit callback. Runs under the deadline guard and a panic trap.
    fn visit(
        &mut self,
        token: &CanonicalToken,
        position: usize,
        index: &StructureIndex,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// One result per pass, collected after the last token.
    fn finalize(&mut self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// One recorded collector failure from a dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Registered collector identity.
    pub collector: String,
    /// Token position being visited (the pass length for finalize
    /// failures).
    pub position: usize,
    /// What went wrong.
    pub kind: FailureKind,
}

/// Result of one dispatch pass.
#[derive(Debug, Serialize)]
pub struct DispatchOutcome {
    /// Finalize results keyed by collector identity.
    pub findings: BTreeMap<String, serde_json::Value>,
    /// Pass-level failure log; empty when every callback behaved.
    pub failures: Vec<FailureRecord>,
}

struct RegisteredCollector {
    name: String,
    ignore_mask: u64,
    collector: Box<dyn Collector>,
}

/// Collector registry and dispatch engine.
///
/// Registration order is dispatch order. A dispatcher can run any number
/// of passes, each against any built index; the index is never mutated.
pub struct Dispatcher {
    collectors: Vec<RegisteredCollector>,
    routing: HashMap<String, Vec<usize>>,
    type_bits: HashMap<String, u64>,
    next_bit: usize,
    timeout_secs: u64,
    strict: bool,
    in_pass: Rc<Cell<bool>>,
}

impl Dispatcher {
    /// A dispatcher with the config's timeout and strict settings.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            collectors: Vec::new(),
            routing: HashMap::new(),
            type_bits: HashMap::new(),
            next_bit: 0,
            timeout_secs: config.collector_timeout_secs,
            strict: config.strict,
            in_pass: Rc::new(Cell::new(false)),
        }
    }

    /// Number of registered collectors.
    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    /// True when no collector is registered.
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// True when an identity is already registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.collectors.iter().any(|entry| entry.name == name)
    }

    /// Registers a collector. Re-registering an identity already present
    /// is a no-op; the first registration wins.
    pub fn register(&mut self, collector: Box<dyn Collector>) -> Result<(), DispatchError> {
        let name = collector.name().to_string();
        if self.is_registered(&name) {
            return Ok(());
        }

        // Reserve bits in two phases so a capacity error mutates nothing.
        let ignore_types = collector.ignore_inside();
        let mut fresh: Vec<&String> = ignore_types
            .iter()
            .filter(|ty| !self.type_bits.contains_key(*ty))
            .collect();
        fresh.dedup();
        if self.next_bit + fresh.len() > BIT_CAPACITY {
            return Err(DispatchError::TooManyWatchedTypes {
                limit: BIT_CAPACITY,
            });
        }
        for ty in fresh {
            self.type_bits.insert(ty.clone(), 1u64 << self.next_bit);
            self.next_bit += 1;
        }

        let ignore_mask = ignore_types
            .iter()
            .fold(0u64, |mask, ty| mask | self.type_bits[ty]);

        let idx = self.collectors.len();
        for ty in collector.interests() {
            self.routing.entry(ty).or_default().push(idx);
        }
        self.collectors.push(RegisteredCollector {
            name,
            ignore_mask,
            collector,
        });
        Ok(())
    }

    /// Runs one dispatch pass over a built index.
    ///
    /// In non-strict mode the pass always completes; per-collector
    /// problems land in the outcome's failure log. Strict mode aborts on
    /// the first failure.
    pub fn run(&mut self, index: &StructureIndex) -> Result<DispatchOutcome, DispatchError> {
        if self.in_pass.get() {
            return Err(DispatchError::Reentrant);
        }
        let _guard = PassGuard::enter(&self.in_pass);

        let timeout_secs = self.timeout_secs;
        let strict = self.strict;
        let Self {
            collectors,
            routing,
            type_bits,
            ..
        } = self;

        let mut failures: Vec<FailureRecord> = Vec::new();
        let mut ctx = DispatchContext::new();

        for (pos, tok) in index.tokens().iter().enumerate() {
            // A closer is not inside the structure it closes, so the
            // ancestor state updates before routing; symmetrically an
            // opener is not inside itself, so it pushes after routing.
            if tok.is_closer() {
                if let Some(ty) = ctx.ancestors.pop() {
                    if let Some(&bit) = type_bits.get(ty) {
                        ctx.leave(bit);
                    }
                }
            }

            if let Some(candidates) = routing.get(&tok.token_type) {
                for &ci in candidates {
                    let entry = &mut collectors[ci];
                    if entry.ignore_mask & ctx.open_mask != 0 {
                        continue;
                    }
                    if !entry.collector.accepts(tok) {
                        continue;
                    }
                    if !entry.collector.ready() {
                        continue;
                    }

                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        deadline::run_with_deadline(timeout_secs, || {
                            entry.collector.visit(tok, pos, index)
                        })
                    }));
                    let kind = match outcome {
                        Err(_) => Some(FailureKind::Panicked),
                        Ok(Err(_expired)) => Some(FailureKind::Timeout),
                        Ok(Ok(Err(_))) => Some(FailureKind::Error),
                        Ok(Ok(Ok(()))) => None,
                    };
                    if let Some(kind) = kind {
                        if strict {
                            return Err(DispatchError::CollectorFailed {
                                name: entry.name.clone(),
                                position: pos,
                                kind,
                            });
                        }
                        failures.push(FailureRecord {
                            collector: entry.name.clone(),
                            position: pos,
                            kind,
                        });
                    }
                }
            }

            if tok.is_opener() {
                ctx.ancestors.push(&tok.token_type);
                if let Some(&bit) = type_bits.get(&tok.token_type) {
                    ctx.enter(bit);
                }
            }
        }

        let mut findings = BTreeMap::new();
        for entry in collectors.iter_mut() {
            let value = catch_unwind(AssertUnwindSafe(|| entry.collector.finalize()));
            match value {
                Ok(value) => {
                    findings.insert(entry.name.clone(), value);
                }
                Err(_) => {
                    if strict {
                        return Err(DispatchError::CollectorFailed {
                            name: entry.name.clone(),
                            position: index.len(),
                            kind: FailureKind::Panicked,
                        });
                    }
                    failures.push(FailureRecord {
                        collector: entry.name.clone(),
                        position: index.len(),
                        kind: FailureKind::Panicked,
                    });
                    findings.insert(entry.name.clone(), serde_json::Value::Null);
                }
            }
        }

        Ok(DispatchOutcome { findings, failures })
    }
}

/// Per-pass scratch state, discarded when the pass ends.
struct DispatchContext<'a> {
    /// Types of currently-open ancestors, innermost last.
    ancestors: Vec<&'a str>,
    /// One bit per watched type currently open at least once.
    open_mask: u64,
    /// Open count per watched bit; nested structures of one type share a
    /// bit, so the bit clears only when the outermost one closes.
    open_counts: HashMap<u64, u32>,
}

impl<'a> DispatchContext<'a> {
    fn new() -> Self {
        Self {
            ancestors: Vec::new(),
            open_mask: 0,
            open_counts: HashMap::new(),
        }
    }

    fn enter(&mut self, bit: u64) {
        let count = self.open_counts.entry(bit).or_insert(0);
        if *count == 0 {
            self.open_mask |= bit;
        }
        *count += 1;
    }

    fn leave(&mut self, bit: u64) {
        if let Some(count) = self.open_counts.get_mut(&bit) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.open_mask &= !bit;
            }
        }
    }
}

/// Clears the in-pass flag on every exit path, unwinds included.
struct PassGuard {
    flag: Rc<Cell<bool>>,
}

impl PassGuard {
    fn enter(flag: &Rc<Cell<bool>>) -> Self {
        flag.set(true);
        Self {
            flag: Rc::clone(flag),
        }
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}
