use std::sync::Arc;

use pretty_assertions::assert_eq;

use dfc_backend::{
    controllers::input::input_controller,
    db::Database,
    generate, BackEndOptions,
};
use dfc_common::error::{Error, Result};
use dfc_library::{
    entry::LibraryEntry,
    kind::CoreKind,
    port::{LibraryPort, PortDirection, PortType},
    store::{FileKind, Library},
};
use dfc_query::{
    graph::{
        Block, ComponentKind, Graph, Induction, InductionEnd, StreamBuffer, StreamDirection,
        ValueInfo,
    },
    instruction::{BinaryOp, Instruction, RedundancyKind},
    GraphQueries,
};
use dfc_vhdl::{
    component::{ComponentDecl, ComponentPort},
    entity::{Entity, RenderOptions},
    value::Value,
    variable::Mode,
};

fn core(name: &str, kind: CoreKind, widths: &[u32]) -> LibraryEntry {
    let mut ports = LibraryEntry::standard_ports();
    let (result, operands) = widths.split_last().unwrap();
    for (index, width) in operands.iter().enumerate() {
        ports.push(LibraryPort::new(format!("a{}", index), PortDirection::In, *width));
    }
    ports.push(LibraryPort::new("result", PortDirection::Out, *result));
    LibraryEntry::new(name, kind, 10, ports)
}

fn library(entries: Vec<LibraryEntry>) -> Result<Library> {
    let mut library = Library::default();
    for entry in entries {
        library.create_entry(entry)?;
    }
    Ok(library)
}

/// `q = n / d` on signed 32-bit scalars, or the float add `s = x + y`.
fn binary(op: BinaryOp, operand: ValueInfo, result: ValueInfo) -> Result<Graph> {
    let mut graph = Graph::new("divide", ComponentKind::Module, 12);
    let mut second = operand.clone();
    second.name = "d".to_string();
    let n = graph.add_value(operand)?;
    let d = graph.add_value(second)?;
    let q = graph.add_value(result)?;
    let inputs = graph.add_block(
        Block::new("inputs", 12)
            .with(Instruction::InputScalar { lhs: n })
            .with(Instruction::InputScalar { lhs: d }),
    );
    let body = graph.add_block(
        Block::new("divide", 1)
            .with_delay(10)
            .with_predecessors(vec![inputs])
            .with(Instruction::Binary {
                op,
                lhs: q,
                a: n,
                b: d,
            }),
    );
    graph.sink = graph.add_block(
        Block::new("outputs", 0)
            .with_predecessors(vec![body])
            .with(Instruction::OutputScalar { value: q }),
    );
    Ok(graph)
}

#[test]
fn division_relaxes_to_a_wider_core() -> Result<()> {
    let graph = binary(
        BinaryOp::SDiv,
        ValueInfo::int("n", 32).signed(),
        ValueInfo::int("q", 32).signed(),
    )?;
    let mut db = Database::new(
        library(vec![core("div48", CoreKind::IntDiv, &[48, 48, 48])])?,
        graph,
    );
    let generated = generate(&mut db, &BackEndOptions::default())?;

    let calls: Vec<_> = db
        .graph()
        .instructions()
        .filter_map(|(_, instruction)| match instruction {
            Instruction::Call { callee, .. } => Some(callee.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(calls, vec!["div48".to_string()]);

    let names: Vec<_> = generated.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["divide.vhdl", "HelperFunctions.vhdl"]);
    assert_eq!(generated.files[1].kind, FileKind::Package);
    let code = &generated.files[0].contents;
    assert!(code.contains("U0 : div48"));
    assert!(code.contains("signal n_resize : STD_LOGIC_VECTOR(47 downto 0);"));
    assert!(code.contains("a0 => n_resize,"));
    assert!(code.contains("q <= q_resize(31 downto 0);"));

    assert_eq!(generated.entry.kind, CoreKind::Module);
    assert_eq!(generated.entry.delay, 12);
    assert!(generated.entry.port("n_in").is_some());
    assert!(generated.entry.port("q_out").is_some());
    Ok(())
}

#[test]
fn float_widths_never_relax() -> Result<()> {
    let graph = binary(
        BinaryOp::FAdd,
        ValueInfo::float("x", 32),
        ValueInfo::float("s", 64),
    )?;
    let mut db = Database::new(
        library(vec![core("fadd32", CoreKind::FpAdd, &[32, 32, 32])])?,
        graph,
    );
    assert!(matches!(
        generate(&mut db, &BackEndOptions::default()),
        Err(Error::ResolutionError(_))
    ));
    Ok(())
}

#[test]
fn port_mappings_extend_but_never_truncate() -> Result<()> {
    let mut entity = Entity::try_new("mapping")?;
    let signed = entity.create_signed_signal("s", 8)?;
    let unsigned = entity.create_signal("u", 8)?;
    let wide = entity.create_signal("w", 16)?;
    let decl = Arc::new(ComponentDecl::try_new(
        "pair",
        vec![],
        vec![
            ComponentPort::try_new("a", Mode::In, 16)?,
            ComponentPort::try_new("b", Mode::In, 16)?,
            ComponentPort::try_new("c", Mode::In, 8)?,
        ],
    )?);
    let u0 = entity.add_component("U0", decl)?;
    entity.map_port(u0, "a", signed)?;
    entity.map_port(u0, "b", unsigned)?;
    assert!(matches!(
        entity.map_port(u0, "c", wide),
        Err(Error::MappingError(_))
    ));
    entity.map_port(u0, "c", Value::zeros(8))?;

    let code = entity.generate_code(&RenderOptions::default())?;
    let sign = vec!["s(7)"; 8].join(" & ");
    assert!(code.contains(&format!("a => ({} & s),", sign)));
    assert!(code.contains("b => (\"00000000\" & u),"));
    Ok(())
}

#[test]
fn second_driver_names_both_owners() -> Result<()> {
    let mut entity = Entity::try_new("drivers")?;
    let result = entity.add_port("result", 8, Mode::Out)?;
    let first = entity.create_process("first")?;
    let second = entity.create_process("second")?;
    entity.assign(first, result, Value::zeros(8))?;
    let err = entity.assign(second, result, Value::zeros(8)).unwrap_err();
    assert_eq!(
        err,
        Error::DriverConflict(
            "result is driven by process 'first' in entity 'drivers' and cannot also be driven by process 'second' in entity 'drivers'"
                .to_string()
        )
    );
    Ok(())
}

#[test]
fn done_follows_the_last_induction() -> Result<()> {
    let mut graph = Graph::new("count", ComponentKind::System, 2);
    graph.streams.push(
        StreamBuffer::new("A", StreamDirection::Input, 16).with_channels(1, 1),
    );
    graph.stream_order.push("A".to_string());
    graph.inductions.push(Induction {
        name: "i".to_string(),
        width: 32,
        value: None,
        start: 0,
        step: 1,
        end: Some(InductionEnd::Constant(100)),
    });
    let a = graph.add_value(ValueInfo::int("a", 16))?;
    graph.sink = graph.add_block(Block::new("body", 2).with(Instruction::InputStream {
        lhs: a,
        stream: "A".to_string(),
        index: 0,
    }));

    let controller = input_controller(&graph, 0)?;
    let code = controller.entity.generate_code(&RenderOptions::default())?;
    assert!(code.contains("outputReady <= consume;"));
    assert!(code.contains(
        "done <= '1' when ((done_latched = '1') or ((consume = '1') and DFC_SGTE(DFC_ADD(i_value, "
    ));
    assert!(code.contains("done_latched <= '1';"));
    Ok(())
}

#[test]
fn systems_bring_their_controllers() -> Result<()> {
    let mut graph = Graph::new("copy", ComponentKind::System, 1);
    graph
        .streams
        .push(StreamBuffer::new("A", StreamDirection::Input, 8).with_channels(1, 1));
    graph
        .streams
        .push(StreamBuffer::new("B", StreamDirection::Output, 8).with_channels(1, 1));
    graph.stream_order = vec!["A".to_string(), "B".to_string()];
    graph.inductions.push(Induction {
        name: "i".to_string(),
        width: 32,
        value: None,
        start: 0,
        step: 1,
        end: Some(InductionEnd::Port),
    });
    let a = graph.add_value(ValueInfo::int("a", 8))?;
    graph.sink = graph.add_block(
        Block::new("body", 1)
            .with(Instruction::InputStream {
                lhs: a,
                stream: "A".to_string(),
                index: 0,
            })
            .with(Instruction::OutputStream {
                value: a,
                stream: "B".to_string(),
                index: 0,
            }),
    );
    let mut db = Database::new(Library::default(), graph);
    let generated = generate(&mut db, &BackEndOptions::default())?;

    let names: Vec<_> = generated.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "copy.vhdl",
            "copy_InputController.vhdl",
            "copy_OutputController.vhdl",
            "InferredBRAMFifo_8.vhdl",
            "HelperFunctions.vhdl",
        ]
    );
    assert_eq!(generated.entry.kind, CoreKind::System);
    assert!(generated.entry.port("i_end").is_some());
    let streams = generated.entry.streams()?;
    assert_eq!(streams.len(), 2);
    Ok(())
}

#[test]
fn modules_cannot_count_loops() -> Result<()> {
    let mut graph = binary(
        BinaryOp::Add,
        ValueInfo::int("n", 8),
        ValueInfo::int("q", 8),
    )?;
    graph.inductions.push(Induction {
        name: "i".to_string(),
        width: 8,
        value: None,
        start: 0,
        step: 1,
        end: None,
    });
    let mut db = Database::new(Library::default(), graph);
    assert!(matches!(
        generate(&mut db, &BackEndOptions::default()),
        Err(Error::BackEndError(_))
    ));
    Ok(())
}

#[test]
fn triple_votes_call_the_voting_core() -> Result<()> {
    let mut graph = Graph::new("tmr", ComponentKind::Module, 3);
    let copies = ["x0", "x1", "x2"]
        .into_iter()
        .map(|name| graph.add_value(ValueInfo::int(name, 16)))
        .collect::<Result<Vec<_>>>()?;
    let voted = graph.add_value(ValueInfo::int("voted", 16))?;
    let mut inputs = Block::new("inputs", 3);
    for copy in &copies {
        inputs = inputs.with(Instruction::InputScalar { lhs: *copy });
    }
    let inputs = graph.add_block(inputs);
    let vote = graph.add_block(
        Block::new("vote", 1)
            .with_predecessors(vec![inputs])
            .with(Instruction::Redundancy {
                kind: RedundancyKind::TripleVote,
                inputs: copies,
                outputs: vec![voted],
            }),
    );
    graph.sink = graph.add_block(
        Block::new("outputs", 0)
            .with_predecessors(vec![vote])
            .with(Instruction::OutputScalar { value: voted }),
    );

    let mut voter = core("vote16", CoreKind::TripleVote, &[16, 16, 16, 16]);
    voter
        .ports
        .push(LibraryPort::new("error", PortDirection::Out, 1).with_type(PortType::Debug));
    let mut db = Database::new(library(vec![voter])?, graph);
    let generated = generate(&mut db, &BackEndOptions::default())?;

    let code = &generated.files[0].contents;
    assert!(code.contains("U0 : vote16"));
    assert!(code.contains("a0 => x0_registered,"));
    assert!(code.contains("a2 => x2_registered,"));
    assert!(code.contains("result => voted"));
    assert!(code.contains("vote16_U0_error : out STD_LOGIC"));
    // The call loads in stage 2 and its result is read in stage 0.
    assert!(code.contains("U0_load <= '1';"));
    assert!(code.contains("voted_out <= voted;"));
    assert!(generated.entry.port("vote16_U0_error").is_some());
    Ok(())
}
