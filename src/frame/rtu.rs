use super::*;

/// RTU application data unit: slave address, PDU and (on the wire) CRC.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtuFrame<'r> {
    pub slave: SlaveId,
    pub pdu: Pdu<'r>,
}
