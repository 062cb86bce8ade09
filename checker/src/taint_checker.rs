// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::ast::StmtId;
use crate::checkers::Checker;
use crate::core_engine::NodeBuilder;
use crate::defects::DefectKind;
use crate::known_names::KnownNames;
use crate::program_state::GenericDataMap;
use crate::sval::SVal;
use crate::symbols::{SymbolData, SymbolId};
use crate::value_factory::ValueFactory;

/// Propagates taint from source callees and reports tainted data reaching
/// dangerous sinks. Enabled by `track_taint`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TaintChecker;

impl TaintChecker {
    /// A symbol is tainted if it was marked directly or derives from a
    /// tainted symbol.
    fn symbol_tainted(factory: &ValueFactory, gdm: &GenericDataMap, sym: SymbolId) -> bool {
        if gdm.taint.contains(&sym) {
            return true;
        }
        match *factory.symbols.data(sym) {
            SymbolData::IntExpr { lhs, .. } => Self::symbol_tainted(factory, gdm, lhs),
            SymbolData::SymExpr { lhs, rhs, .. } => {
                Self::symbol_tainted(factory, gdm, lhs) || Self::symbol_tainted(factory, gdm, rhs)
            }
            SymbolData::RegionValue { region } => factory
                .regions
                .region_symbol(region)
                .map(|base| Self::symbol_tainted(factory, gdm, base))
                .unwrap_or(false),
            _ => false,
        }
    }

    fn value_tainted(factory: &ValueFactory, gdm: &GenericDataMap, val: &SVal) -> bool {
        let mut symbols = vec![];
        val.collect_symbols(&factory.basic_values, &factory.regions, &mut symbols);
        symbols
            .into_iter()
            .any(|sym| Self::symbol_tainted(factory, gdm, sym))
    }
}

impl Checker for TaintChecker {
    fn name(&self) -> &'static str {
        "taint"
    }

    /// Tainted data flowing into a dangerous callee is a defect.
    fn pre_call(
        &self,
        b: &mut NodeBuilder<'_, '_>,
        _call: StmtId,
        _callee: &SVal,
        args: &[SVal],
        known: KnownNames,
    ) -> bool {
        if !known.is_taint_sink() {
            return true;
        }
        for arg in args {
            if Self::value_tainted(&b.core.factory, &b.state.gdm, arg) {
                let state = b.state.clone();
                b.generate_sink(DefectKind::TaintReachesSink, state);
                return false;
            }
        }
        true
    }

    /// The result of a source callee carries attacker controlled data.
    fn post_call(
        &self,
        b: &mut NodeBuilder<'_, '_>,
        call: StmtId,
        _callee: &SVal,
        _args: &[SVal],
        known: KnownNames,
    ) {
        if !known.is_taint_source() {
            return;
        }
        if let Some(val) = b.state.env.value_of(call).cloned() {
            let mut symbols = vec![];
            val.collect_symbols(
                &b.core.factory.basic_values,
                &b.core.factory.regions,
                &mut symbols,
            );
            for sym in symbols {
                b.state = b.state.with_gdm(b.state.gdm.with_taint(sym));
            }
        }
    }
}
