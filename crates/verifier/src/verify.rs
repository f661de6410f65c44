use toccata_cfg::{Block, CfgBlock, ControlFlowGraph, Loop};

use crate::{
    diagnostic::{Diagnostic, DiagnosticCode, Location},
    report::VerificationReport,
    VerifierConfig,
};

/// Checks every structural invariant of a fully built graph and loop forest.
///
/// A violation is a bug in an earlier pass, never a recoverable condition;
/// the report exists to carry the offending block or loop into the panic
/// message of [`verify_graph_or_panic`] and the
/// [`debug_verify_cfg!`](crate::debug_verify_cfg) assertion.
pub fn verify_graph<B: CfgBlock>(
    cfg: &ControlFlowGraph<B>,
    config: &VerifierConfig,
) -> VerificationReport {
    let mut report = VerificationReport::default();
    if cfg.block_count() == 0 {
        return report;
    }

    for block in cfg.blocks() {
        verify_block_refs(cfg, block, config, &mut report);
        verify_edges(cfg, block, config, &mut report);
        verify_dominator_links(cfg, block, config, &mut report);
        if config.check_postdominators {
            verify_postdominator(cfg, block, config, &mut report);
        }
        verify_header_loop(cfg, block, config, &mut report);
    }

    if config.check_loops {
        for lp in cfg.loops() {
            verify_loop(cfg, lp, config, &mut report);
        }
    }

    report
}

pub fn verify_graph_or_panic<B: CfgBlock>(cfg: &ControlFlowGraph<B>, config: &VerifierConfig) {
    let report = verify_graph(cfg, config);
    if report.has_errors() {
        eprintln!("TOCCATA_CFG_VERIFY_FAILURE");
        eprintln!("{report}");
        panic!("TOCCATA_CFG_VERIFY_FAILURE");
    }
}

fn block_in_range<B: CfgBlock>(cfg: &ControlFlowGraph<B>, block: Block) -> bool {
    (block.as_u32() as usize) < cfg.block_count()
}

fn loop_in_range<B: CfgBlock>(cfg: &ControlFlowGraph<B>, lp: Loop) -> bool {
    (lp.as_u32() as usize) < cfg.loop_count()
}

/// Every block reference stored on `block` must resolve within the arena.
fn verify_block_refs<B: CfgBlock>(
    cfg: &ControlFlowGraph<B>,
    block: Block,
    config: &VerifierConfig,
    report: &mut VerificationReport,
) {
    let data = &cfg[block];
    let dom = data.dom();

    let stored = data
        .preds()
        .iter()
        .chain(data.succs())
        .copied()
        .chain(dom.dominator())
        .chain(dom.first_dominated())
        .chain(dom.dominated_sibling())
        .chain(data.postdominator());
    for referenced in stored {
        if !block_in_range(cfg, referenced) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::InvalidBlockRef,
                    format!("reference to non-existent block {referenced}"),
                    Location::Block(block),
                ),
                config.max_diagnostics,
            );
        }
    }

    if let Some(lp) = data.containing_loop() {
        if !loop_in_range(cfg, lp) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::InvalidLoopRef,
                    format!("reference to non-existent loop {lp}"),
                    Location::Block(block),
                ),
                config.max_diagnostics,
            );
        }
    }
}

/// Pred/succ symmetry and the reverse post order law: ids increase along
/// every edge except loop back edges.
fn verify_edges<B: CfgBlock>(
    cfg: &ControlFlowGraph<B>,
    block: Block,
    config: &VerifierConfig,
    report: &mut VerificationReport,
) {
    for &pred in cfg[block].preds() {
        if !block_in_range(cfg, pred) {
            continue;
        }
        if !cfg[pred].succs().contains(&block) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::EdgeNotSymmetric,
                    format!("{block} lists predecessor {pred}, which does not list it back"),
                    Location::Edge {
                        from: pred,
                        to: block,
                    },
                ),
                config.max_diagnostics,
            );
        }
        if pred >= block && !cfg[pred].is_loop_end() {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::ForwardEdgeDecreasesId,
                    format!("predecessor {pred} has a higher id than {block} but is not a loop end"),
                    Location::Edge {
                        from: pred,
                        to: block,
                    },
                ),
                config.max_diagnostics,
            );
        }
    }

    for &succ in cfg[block].succs() {
        if !block_in_range(cfg, succ) {
            continue;
        }
        if !cfg[succ].preds().contains(&block) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::EdgeNotSymmetric,
                    format!("{block} lists successor {succ}, which does not list it back"),
                    Location::Edge {
                        from: block,
                        to: succ,
                    },
                ),
                config.max_diagnostics,
            );
        }
        if succ <= block && !cfg[succ].is_loop_header() {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::BackEdgeToNonHeader,
                    format!("successor {succ} has a lower id than {block} but is not a loop header"),
                    Location::Edge {
                        from: block,
                        to: succ,
                    },
                ),
                config.max_diagnostics,
            );
        }
    }
}

/// Walks `block`'s intrusive dominated-child list, bounded by the block
/// count so a corrupted sibling link terminates with an error instead of
/// looping.
fn collect_children<B: CfgBlock>(
    cfg: &ControlFlowGraph<B>,
    block: Block,
) -> Result<Vec<Block>, ()> {
    let mut children = Vec::new();
    let mut cur = cfg[block].dom().first_dominated();
    while let Some(child) = cur {
        if !block_in_range(cfg, child) || children.len() > cfg.block_count() {
            return Err(());
        }
        children.push(child);
        cur = cfg[child].dom().dominated_sibling();
    }
    Ok(children)
}

/// Round-trip consistency between the `dominator` back link and the
/// `first_dominated`/`dominated_sibling` forward links.
fn verify_dominator_links<B: CfgBlock>(
    cfg: &ControlFlowGraph<B>,
    block: Block,
    config: &VerifierConfig,
    report: &mut VerificationReport,
) {
    if let Some(dominator) = cfg[block].dom().dominator() {
        if !block_in_range(cfg, dominator) {
            return;
        }
        if dominator >= block {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::DominatorIdNotLower,
                    format!("dominator {dominator} does not precede {block} in reverse post order"),
                    Location::Block(block),
                ),
                config.max_diagnostics,
            );
        }
        // A broken list is reported once, by the list owner's own check
        // below.
        if let Ok(children) = collect_children(cfg, dominator) {
            if !children.contains(&block) {
                report.push(
                    Diagnostic::error(
                        DiagnosticCode::DominatorListMissingChild,
                        format!("{block} is not in the dominated list of its dominator {dominator}"),
                        Location::Block(block),
                    ),
                    config.max_diagnostics,
                );
            }
        }
    }

    match collect_children(cfg, block) {
        Ok(children) => {
            for child in children {
                if child <= block {
                    report.push(
                        Diagnostic::error(
                            DiagnosticCode::DominatedChildIdNotHigher,
                            format!("dominated block {child} does not follow {block} in reverse post order"),
                            Location::Block(block),
                        ),
                        config.max_diagnostics,
                    );
                }
                if cfg[child].dom().dominator() != Some(block) {
                    report.push(
                        Diagnostic::error(
                            DiagnosticCode::DominatedChildBackLinkBroken,
                            format!("dominated block {child} does not name {block} as its dominator"),
                            Location::Block(block),
                        ),
                        config.max_diagnostics,
                    );
                }
            }
        }
        Err(()) => {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::DominatedListCycle,
                    "dominated list does not terminate",
                    Location::Block(block),
                ),
                config.max_diagnostics,
            );
        }
    }
}

/// The post dominator must be reachable from every successor along paths
/// whose ids stay within `[block, postdom]`; a dead end on the way is a
/// violation.
fn verify_postdominator<B: CfgBlock>(
    cfg: &ControlFlowGraph<B>,
    block: Block,
    config: &VerifierConfig,
    report: &mut VerificationReport,
) {
    let Some(postdom) = cfg[block].postdominator() else {
        return;
    };
    if !block_in_range(cfg, postdom) {
        return;
    }

    let mut visited = cfg.create_block_set();
    let mut stack = Vec::new();
    let mut reached = false;

    for &succ in cfg[block].succs() {
        if !block_in_range(cfg, succ) {
            return;
        }
        if succ == postdom {
            reached = true;
        } else if succ >= block && succ <= postdom && visited.insert(succ) {
            stack.push(succ);
        }
    }

    while let Some(cur) = stack.pop() {
        if cfg[cur].succs().is_empty() {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::PostdomPathDeadEnd,
                    format!("path from {block} dead-ends at {cur} before its post dominator {postdom}"),
                    Location::Block(block),
                ),
                config.max_diagnostics,
            );
            return;
        }
        for &succ in cfg[cur].succs() {
            if !block_in_range(cfg, succ) {
                return;
            }
            if succ == postdom {
                reached = true;
            } else if succ >= block && succ <= postdom && visited.insert(succ) {
                stack.push(succ);
            }
        }
    }

    if !reached {
        report.push(
            Diagnostic::error(
                DiagnosticCode::PostdomUnreachable,
                format!("post dominator {postdom} is not reachable from the successors of {block}"),
                Location::Block(block),
            ),
            config.max_diagnostics,
        );
    }
}

/// A loop header block must be claimed as header by the loop it points at.
fn verify_header_loop<B: CfgBlock>(
    cfg: &ControlFlowGraph<B>,
    block: Block,
    config: &VerifierConfig,
    report: &mut VerificationReport,
) {
    if !cfg[block].is_loop_header() {
        return;
    }
    let claimed = cfg[block]
        .containing_loop()
        .filter(|lp| loop_in_range(cfg, *lp))
        .map(|lp| cfg.loop_data(lp).header());
    if claimed != Some(block) {
        report.push(
            Diagnostic::error(
                DiagnosticCode::LoopHeaderMismatch,
                format!("loop header block {block} is not the header of its own loop"),
                Location::Block(block),
            ),
            config.max_diagnostics,
        );
    }
}

/// Ascends `block`'s innermost-loop chain, bounded by the loop count.
/// Returns whether `lp` occurs on the chain; a cycle counts as not found.
fn loop_chain_contains<B: CfgBlock>(cfg: &ControlFlowGraph<B>, block: Block, lp: Loop) -> bool {
    let mut cur = cfg[block].containing_loop();
    let mut steps = 0;
    while let Some(inner) = cur {
        if !loop_in_range(cfg, inner) || steps > cfg.loop_count() {
            return false;
        }
        if inner == lp {
            return true;
        }
        cur = cfg.loop_data(inner).parent();
        steps += 1;
    }
    false
}

fn verify_loop<B: CfgBlock>(
    cfg: &ControlFlowGraph<B>,
    lp: Loop,
    config: &VerifierConfig,
    report: &mut VerificationReport,
) {
    let data = cfg.loop_data(lp);
    let header = data.header();
    if !block_in_range(cfg, header) {
        report.push(
            Diagnostic::error(
                DiagnosticCode::InvalidBlockRef,
                format!("loop header {header} does not exist"),
                Location::Loop(lp),
            ),
            config.max_diagnostics,
        );
        return;
    }

    if !cfg[header].is_loop_header() {
        report.push(
            Diagnostic::error(
                DiagnosticCode::HeaderNotLoopHeader,
                format!("header {header} is not flagged as a loop header"),
                Location::Loop(lp),
            ),
            config.max_diagnostics,
        );
    }

    let mut members = cfg.create_block_set();
    for &member in data.blocks() {
        if block_in_range(cfg, member) {
            members.insert(member);
        }
    }

    for &member in data.blocks() {
        if !block_in_range(cfg, member) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::InvalidBlockRef,
                    format!("member block {member} does not exist"),
                    Location::Loop(lp),
                ),
                config.max_diagnostics,
            );
            continue;
        }
        if member < header {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::LoopBlockIdBelowHeader,
                    format!("member {member} precedes the loop header {header}"),
                    Location::Loop(lp),
                ),
                config.max_diagnostics,
            );
        }
        if !loop_chain_contains(cfg, member, lp) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::LoopMembershipBroken,
                    format!("member {member} does not reach this loop through its loop chain"),
                    Location::Loop(lp),
                ),
                config.max_diagnostics,
            );
        }

        // Natural loops are predecessor-closed everywhere except at the
        // header, the sole entry.
        if member != header {
            for &pred in cfg[member].preds() {
                if block_in_range(cfg, pred) && !members.contains(pred) {
                    report.push(
                        Diagnostic::error(
                            DiagnosticCode::LoopNotClosed,
                            format!("non-header member {member} has predecessor {pred} outside the loop"),
                            Location::Loop(lp),
                        ),
                        config.max_diagnostics,
                    );
                }
            }
        }
    }

    verify_exit_set(cfg, lp, data.exits(), "exit set", config, report);
    verify_exit_set(cfg, lp, data.natural_exits(), "natural exit set", config, report);
}

fn verify_exit_set<B: CfgBlock>(
    cfg: &ControlFlowGraph<B>,
    lp: Loop,
    exits: &[Block],
    what: &str,
    config: &VerifierConfig,
    report: &mut VerificationReport,
) {
    if exits.windows(2).any(|pair| pair[0] >= pair[1]) {
        report.push(
            Diagnostic::error(
                DiagnosticCode::LoopExitsNotSorted,
                format!("{what} is not sorted by block id"),
                Location::Loop(lp),
            ),
            config.max_diagnostics,
        );
    }

    let header = cfg.loop_data(lp).header();
    for &exit in exits {
        if !block_in_range(cfg, exit) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::InvalidBlockRef,
                    format!("{what} names non-existent block {exit}"),
                    Location::Loop(lp),
                ),
                config.max_diagnostics,
            );
            continue;
        }
        if exit < header {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::LoopExitIdBelowHeader,
                    format!("{what} block {exit} precedes the loop header {header}"),
                    Location::Loop(lp),
                ),
                config.max_diagnostics,
            );
        }
        // An exit has left the loop and everything nested inside it.
        if loop_chain_contains(cfg, exit, lp) {
            report.push(
                Diagnostic::error(
                    DiagnosticCode::LoopExitInsideLoop,
                    format!("{what} block {exit} is still inside the loop"),
                    Location::Loop(lp),
                ),
                config.max_diagnostics,
            );
        }
    }
}
