use crate::{
    entry::LibraryEntry,
    kind::CoreKind,
    port::{LibraryPort, PortDirection, PortType},
};

/// The complete port set of one stream.
pub(crate) fn stream_ports(
    name: &str,
    direction: PortDirection,
    width: u32,
    channels: usize,
    address_pairs: usize,
) -> Vec<LibraryPort> {
    let control = |suffix: &str, direction, port_type| {
        LibraryPort::new(format!("{}_{}", name, suffix), direction, 1)
            .with_type(port_type)
            .with_readable_name(name)
    };
    let mut ports = vec![
        control("clk", PortDirection::In, PortType::StreamCrossClk),
        control("stop_access", PortDirection::In, PortType::StreamStopAccess),
        control("enable_access", PortDirection::Out, PortType::StreamEnableAccess),
        control("address_clk", PortDirection::In, PortType::StreamAddressClk),
        control("address_rdy", PortDirection::Out, PortType::StreamAddressRdy),
        control("address_stall", PortDirection::In, PortType::StreamAddressStall),
    ];
    for channel in 0..channels {
        ports.push(
            LibraryPort::new(format!("{}_channel{}", name, channel), direction, width)
                .with_type(PortType::StreamChannel)
                .with_readable_name(name),
        );
    }
    for pair in 0..address_pairs {
        ports.push(
            LibraryPort::new(format!("{}_address{}_base", name, pair), PortDirection::Out, 32)
                .with_type(PortType::StreamAddressBase)
                .with_readable_name(name),
        );
        ports.push(
            LibraryPort::new(format!("{}_address{}_count", name, pair), PortDirection::Out, 16)
                .with_type(PortType::StreamAddressCount)
                .with_readable_name(name),
        );
    }
    ports
}

/// A core with the standard preamble and one scalar port per width; the last
/// width is the result.
pub(crate) fn scalar_core(name: &str, kind: CoreKind, widths: &[u32], data_type: &str) -> LibraryEntry {
    let mut ports = LibraryEntry::standard_ports();
    let (result, operands) = match widths.split_last() {
        Some((result, operands)) => (*result, operands),
        None => (32, &[][..]),
    };
    for (index, width) in operands.iter().enumerate() {
        ports.push(
            LibraryPort::new(format!("a{}", index), PortDirection::In, *width).with_data_type(data_type),
        );
    }
    ports.push(LibraryPort::new("result", PortDirection::Out, result).with_data_type(data_type));
    LibraryEntry::new(name, kind, 1, ports)
}
