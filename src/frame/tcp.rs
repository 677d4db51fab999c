use super::*;

pub type TransactionId = u16;

/// MBAP header fields that are not derived from the PDU.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub unit_id: SlaveId,
}

/// TCP application data unit.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFrame<'r> {
    pub hdr: Header,
    pub pdu: Pdu<'r>,
}
