use criterion::{criterion_group, criterion_main, Criterion};
use time::{Duration, OffsetDateTime};
use toc_kernel_core::{
    build_projection, validate_gate, Confidence, Edge, EdgeKind, GateConfig, Graph, Node,
    NodeType, RiskFlag,
};

const OUTCOMES: usize = 10;
const OUTPUTS_PER_OUTCOME: usize = 10;
const ACTIVITIES_PER_OUTPUT: usize = 10;

fn mk_node(id: String, node_type: NodeType, parent: Option<String>, index: usize) -> Node {
    let offset = i64::try_from(index).unwrap_or(i64::MAX);
    Node {
        id,
        node_type: Some(node_type),
        primary_parent_id: parent,
        created_at: OffsetDateTime::UNIX_EPOCH + Duration::seconds(offset),
        title: "bench node".to_string(),
        description: None,
        narrative: None,
    }
}

fn mk_edge(id: String, source: &str, target: &str, edge_kind: EdgeKind) -> Edge {
    Edge {
        id,
        source_node_id: source.to_string(),
        target_node_id: target.to_string(),
        edge_kind,
        mechanism: Some("benchmark mechanism".to_string()),
        confidence: Confidence::High,
        risk_flag: RiskFlag::None,
        sentinel_indicator_id: None,
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

/// Balanced GOAL > OUTCOME > OUTPUT > ACTIVITY tree with causal edges along every
/// primary link and one secondary link per output.
fn mk_graph() -> Graph {
    let mut nodes = vec![mk_node("goal".to_string(), NodeType::Goal, None, 0)];
    let mut edges = Vec::new();

    for outcome in 0..OUTCOMES {
        let outcome_id = format!("outcome-{outcome:03}");
        nodes.push(mk_node(outcome_id.clone(), NodeType::Outcome, Some("goal".to_string()), nodes.len()));
        edges.push(mk_edge(format!("c-{outcome_id}"), "goal", &outcome_id, EdgeKind::Causal));

        for output in 0..OUTPUTS_PER_OUTCOME {
            let output_id = format!("{outcome_id}-output-{output:03}");
            nodes.push(mk_node(output_id.clone(), NodeType::Output, Some(outcome_id.clone()), nodes.len()));
            edges.push(mk_edge(format!("c-{output_id}"), &outcome_id, &output_id, EdgeKind::Causal));

            let sibling = format!("outcome-{:03}", (outcome + 1) % OUTCOMES);
            edges.push(mk_edge(format!("s-{output_id}"), &sibling, &output_id, EdgeKind::SecondaryLink));

            for activity in 0..ACTIVITIES_PER_OUTPUT {
                let activity_id = format!("{output_id}-activity-{activity:03}");
                nodes.push(mk_node(
                    activity_id.clone(),
                    NodeType::Activity,
                    Some(output_id.clone()),
                    nodes.len(),
                ));
                edges.push(mk_edge(format!("c-{activity_id}"), &output_id, &activity_id, EdgeKind::Causal));
            }
        }
    }

    Graph { nodes, edges, rls_baseline_ok: Some(true) }
}

fn bench_gate(c: &mut Criterion) {
    let graph = mk_graph();
    let config = GateConfig::default();

    c.bench_function("gate_a_validation_1111_nodes", |b| {
        b.iter(|| {
            let report = validate_gate(&graph, &config);
            if !report.pass {
                panic!("gate benchmark fixture should pass: {:?}", report.violations);
            }
        });
    });
}

fn bench_projection(c: &mut Criterion) {
    let graph = mk_graph();

    c.bench_function("projection_1111_nodes_100_ghosts", |b| {
        b.iter(|| {
            let rows = build_projection(&graph);
            if rows.len() != graph.nodes.len() + OUTCOMES * OUTPUTS_PER_OUTCOME {
                panic!("unexpected projection row count: {}", rows.len());
            }
        });
    });
}

criterion_group!(gate_benches, bench_gate, bench_projection);
criterion_main!(gate_benches);
