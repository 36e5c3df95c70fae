//! Logical streams: bundles of library ports sharing one readable name.
use dfc_common::{
    error::{Error, Result},
    numbers::BitWidth,
};

use crate::port::{LibraryPort, PortDirection, PortType};

/// A validated stream. Construction fails when any mandatory port is missing,
/// so users never re-check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stream {
    name: String,
    cross_clk: LibraryPort,
    stop_access: LibraryPort,
    enable_access: LibraryPort,
    address_clk: LibraryPort,
    address_rdy: LibraryPort,
    address_stall: LibraryPort,
    data_channels: Vec<LibraryPort>,
    address_base: Vec<LibraryPort>,
    address_count: Vec<LibraryPort>,
}

fn take_one(name: &str, ports: &[LibraryPort], role: PortType) -> Result<LibraryPort> {
    let mut matching = ports.iter().filter(|p| p.port_type == role);
    match (matching.next(), matching.next()) {
        (Some(port), None) => Ok(port.clone()),
        (None, _) => Err(Error::StreamError(format!(
            "stream {} has no port of type {:?}",
            name, role
        ))),
        (Some(_), Some(_)) => Err(Error::StreamError(format!(
            "stream {} has more than one port of type {:?}",
            name, role
        ))),
    }
}

fn take_all(ports: &[LibraryPort], role: PortType) -> Vec<LibraryPort> {
    ports.iter().filter(|p| p.port_type == role).cloned().collect()
}

impl Stream {
    pub fn try_new(name: impl Into<String>, ports: &[LibraryPort]) -> Result<Self> {
        let name = name.into();
        if let Some(port) = ports.iter().find(|p| !p.is_stream()) {
            return Err(Error::StreamError(format!(
                "port {} of stream {} is not a stream port",
                port.name, name
            )));
        }
        let data_channels = take_all(ports, PortType::StreamChannel);
        let address_base = take_all(ports, PortType::StreamAddressBase);
        let address_count = take_all(ports, PortType::StreamAddressCount);
        if data_channels.is_empty() {
            return Err(Error::StreamError(format!(
                "stream {} has no data channel",
                name
            )));
        }
        if data_channels
            .iter()
            .any(|c| c.direction != data_channels[0].direction || c.width != data_channels[0].width)
        {
            return Err(Error::StreamError(format!(
                "the data channels of stream {} differ in direction or width",
                name
            )));
        }
        if address_base.is_empty() || address_base.len() != address_count.len() {
            return Err(Error::StreamError(format!(
                "stream {} needs matching address base and count channels, found {} and {}",
                name,
                address_base.len(),
                address_count.len()
            )));
        }
        Ok(Stream {
            cross_clk: take_one(&name, ports, PortType::StreamCrossClk)?,
            stop_access: take_one(&name, ports, PortType::StreamStopAccess)?,
            enable_access: take_one(&name, ports, PortType::StreamEnableAccess)?,
            address_clk: take_one(&name, ports, PortType::StreamAddressClk)?,
            address_rdy: take_one(&name, ports, PortType::StreamAddressRdy)?,
            address_stall: take_one(&name, ports, PortType::StreamAddressStall)?,
            name,
            data_channels,
            address_base,
            address_count,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input streams carry data into the component.
    pub fn direction(&self) -> PortDirection {
        self.data_channels[0].direction
    }

    /// Width of one data element.
    pub fn width(&self) -> BitWidth {
        self.data_channels[0].width
    }

    pub fn data_channels(&self) -> &[LibraryPort] {
        &self.data_channels
    }

    pub fn address_channels_base(&self) -> &[LibraryPort] {
        &self.address_base
    }

    pub fn address_channels_count(&self) -> &[LibraryPort] {
        &self.address_count
    }

    pub fn cross_clk(&self) -> &LibraryPort {
        &self.cross_clk
    }

    pub fn stop_access(&self) -> &LibraryPort {
        &self.stop_access
    }

    pub fn enable_access(&self) -> &LibraryPort {
        &self.enable_access
    }

    pub fn address_clk(&self) -> &LibraryPort {
        &self.address_clk
    }

    pub fn address_rdy(&self) -> &LibraryPort {
        &self.address_rdy
    }

    pub fn address_stall(&self) -> &LibraryPort {
        &self.address_stall
    }

    /// All ports of the stream, control ports first.
    pub fn ports(&self) -> Vec<&LibraryPort> {
        let mut result = vec![
            &self.cross_clk,
            &self.stop_access,
            &self.enable_access,
        ];
        result.extend(self.data_channels.iter());
        result.extend([&self.address_clk, &self.address_rdy, &self.address_stall]);
        for (base, count) in self.address_base.iter().zip(self.address_count.iter()) {
            result.push(base);
            result.push(count);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::stream_ports;

    #[test]
    fn complete_streams() -> Result<()> {
        for (channels, pairs) in [(1, 1), (3, 1), (2, 4)] {
            let stream = Stream::try_new("A", &stream_ports("A", PortDirection::In, 16, channels, pairs))?;
            assert_eq!(stream.data_channels().len(), channels);
            assert_eq!(stream.address_channels_base().len(), pairs);
            assert_eq!(stream.address_channels_count().len(), pairs);
            assert_eq!(stream.width(), 16);
            assert_eq!(stream.direction(), PortDirection::In);
        }
        Ok(())
    }

    #[test]
    fn missing_ports_are_rejected() {
        let complete = stream_ports("A", PortDirection::Out, 8, 1, 1);
        for role in [
            PortType::StreamCrossClk,
            PortType::StreamStopAccess,
            PortType::StreamEnableAccess,
            PortType::StreamAddressClk,
            PortType::StreamAddressRdy,
            PortType::StreamAddressStall,
            PortType::StreamChannel,
            PortType::StreamAddressBase,
            PortType::StreamAddressCount,
        ] {
            let ports: Vec<_> = complete
                .iter()
                .filter(|p| p.port_type != role)
                .cloned()
                .collect();
            assert!(
                matches!(Stream::try_new("A", &ports), Err(Error::StreamError(_))),
                "missing {:?} was accepted",
                role
            );
        }
    }
}
