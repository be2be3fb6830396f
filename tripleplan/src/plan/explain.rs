// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan explanation
//!
//! Renders an operator graph as an indented tree, starting at each Result and
//! walking towards the sources. Shared operators are printed once and referred
//! to by id afterwards; feedback edges are shown as back references.

use std::collections::HashSet;

use crate::plan::graph::{OperatorGraph, OperatorId};
use crate::plan::operators::Operator;

/// Format the whole graph for debug output
pub fn format_plan(graph: &OperatorGraph) -> String {
    let mut output = String::new();
    let mut printed = HashSet::new();
    let mut tops = graph.results();
    if tops.is_empty() {
        // graphs under construction have no Result yet; start from the sinks
        tops = graph
            .ids()
            .filter(|id| graph.succeeding(*id).is_empty())
            .collect();
    }
    for top in tops {
        format_node(graph, top, 0, &mut printed, &mut output);
    }
    output
}

fn format_node(
    graph: &OperatorGraph,
    id: OperatorId,
    depth: usize,
    printed: &mut HashSet<OperatorId>,
    output: &mut String,
) {
    let prefix = "  ".repeat(depth);
    let Ok(node) = graph.node(id) else {
        output.push_str(&format!("{}<removed {}>\n", prefix, id));
        return;
    };
    if !printed.insert(id) {
        output.push_str(&format!("{}^ {} (shared)\n", prefix, id));
        return;
    }

    let vars: Vec<String> = node.union.iter().map(|v| v.to_string()).collect();
    if vars.is_empty() {
        output.push_str(&format!("{}{} {}\n", prefix, id, node.operator));
    } else {
        output.push_str(&format!(
            "{}{} {} -> {{{}}}\n",
            prefix,
            id,
            node.operator,
            vars.join(" ")
        ));
    }

    if let Operator::Filter(filter) = &node.operator {
        for (key, nested) in &filter.exists {
            output.push_str(&format!("{}  exists #{}:\n", prefix, key));
            for line in format_plan(nested).lines() {
                output.push_str(&format!("{}    {}\n", prefix, line));
            }
        }
    }

    let groups = graph.operand_groups(id);
    let multi = groups.len() > 1 || matches!(node.operator, Operator::Join | Operator::Optional | Operator::Minus);
    for (operand, inputs) in groups {
        let depth = if multi {
            output.push_str(&format!("{}  operand {}:\n", prefix, operand));
            depth + 2
        } else {
            depth + 1
        };
        for input in inputs {
            if input.feedback {
                output.push_str(&format!(
                    "{}<~ {} (loop)\n",
                    "  ".repeat(depth),
                    input.source
                ));
                continue;
            }
            if input.source == graph.root() {
                continue;
            }
            format_node(graph, input.source, depth, printed, output);
        }
    }
}
