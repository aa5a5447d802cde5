//! Wire-level constants: command/response codes, operational-mode bit fields,
//! data-packet flags, and the compact measurement's per-value state-flag byte.

/// Flags carried in the single byte preceding a `DATAPACKET` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataPacketFlags(pub u8);

impl DataPacketFlags {
    pub const NO_FLAGS: DataPacketFlags = DataPacketFlags(0x00);
    pub const COMPACT: DataPacketFlags = DataPacketFlags(0x02);
    pub const CIPHER_INDEX: DataPacketFlags = DataPacketFlags(0x04);
    pub const COMPRESSED: DataPacketFlags = DataPacketFlags(0x08);
    pub const CACHE_INDEX: DataPacketFlags = DataPacketFlags(0x10);

    pub fn contains(self, other: DataPacketFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for DataPacketFlags {
    type Output = DataPacketFlags;
    fn bitor(self, rhs: DataPacketFlags) -> DataPacketFlags {
        DataPacketFlags(self.0 | rhs.0)
    }
}

/// Command codes sent from subscriber to publisher on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerCommand {
    Connect = 0x00,
    MetadataRefresh = 0x01,
    Subscribe = 0x02,
    Unsubscribe = 0x03,
    RotateCipherKeys = 0x04,
    UpdateProcessingInterval = 0x05,
    DefineOperationalModes = 0x06,
    ConfirmNotification = 0x07,
    ConfirmBufferBlock = 0x08,
    ConfirmUpdateBaseTimes = 0x09,
    ConfirmUpdateSignalIndexCache = 0x0A,
    ConfirmUpdateCipherKeys = 0x0B,
    GetPrimaryMetadataSchema = 0x0C,
    GetSignalSelectionSchema = 0x0D,
}

impl ServerCommand {
    pub fn from_u8(code: u8) -> Option<ServerCommand> {
        use ServerCommand::*;
        Some(match code {
            0x00 => Connect,
            0x01 => MetadataRefresh,
            0x02 => Subscribe,
            0x03 => Unsubscribe,
            0x04 => RotateCipherKeys,
            0x05 => UpdateProcessingInterval,
            0x06 => DefineOperationalModes,
            0x07 => ConfirmNotification,
            0x08 => ConfirmBufferBlock,
            0x09 => ConfirmUpdateBaseTimes,
            0x0A => ConfirmUpdateSignalIndexCache,
            0x0B => ConfirmUpdateCipherKeys,
            0x0C => GetPrimaryMetadataSchema,
            0x0D => GetSignalSelectionSchema,
            _ => return None,
        })
    }
}

/// Response codes sent from publisher to subscriber on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerResponse {
    Succeeded = 0x80,
    Failed = 0x81,
    DataPacket = 0x82,
    UpdateSignalIndexCache = 0x83,
    UpdateBaseTimes = 0x84,
    UpdateCipherKeys = 0x85,
    DataStartTime = 0x86,
    ProcessingComplete = 0x87,
    BufferBlock = 0x88,
    Notify = 0x89,
    ConfigurationChanged = 0x8A,
    /// Empty-operation keep-alive ping; accepted and ignored by the reader.
    NoOp = 0xFF,
}

impl ServerResponse {
    pub fn from_u8(code: u8) -> Option<ServerResponse> {
        use ServerResponse::*;
        Some(match code {
            0x80 => Succeeded,
            0x81 => Failed,
            0x82 => DataPacket,
            0x83 => UpdateSignalIndexCache,
            0x84 => UpdateBaseTimes,
            0x85 => UpdateCipherKeys,
            0x86 => DataStartTime,
            0x87 => ProcessingComplete,
            0x88 => BufferBlock,
            0x89 => Notify,
            0x8A => ConfigurationChanged,
            0xFF => NoOp,
            _ => return None,
        })
    }
}

/// Operational-mode bit field negotiated via `DEFINEOPERATIONALMODES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationalModes(pub u32);

impl OperationalModes {
    pub const NO_FLAGS: u32 = 0x0000_0000;
    pub const VERSION_MASK: u32 = 0x0000_00FF;
    pub const ENCODING_MASK: u32 = 0x0000_0300;
    pub const IMPLEMENTATION_SPECIFIC_EXTENSION_MASK: u32 = 0x00FF_0000;
    pub const RECEIVE_EXTERNAL_METADATA: u32 = 0x0200_0000;
    pub const RECEIVE_INTERNAL_METADATA: u32 = 0x0400_0000;
    pub const COMPRESS_PAYLOAD_DATA: u32 = 0x2000_0000;
    pub const COMPRESS_SIGNAL_INDEX_CACHE: u32 = 0x4000_0000;
    pub const COMPRESS_METADATA: u32 = 0x8000_0000;

    pub const CURRENT_VERSION: u32 = 2;

    pub fn version(self) -> u32 {
        self.0 & Self::VERSION_MASK
    }

    pub fn encoding(self) -> u32 {
        self.0 & Self::ENCODING_MASK
    }

    pub fn implementation_specific_extension(self) -> u8 {
        ((self.0 & Self::IMPLEMENTATION_SPECIFIC_EXTENSION_MASK) >> 16) as u8
    }

    pub fn contains(self, mask: u32) -> bool {
        self.0 & mask == mask
    }
}

/// String encoding negotiated as part of operational modes. STTP currently
/// only supports UTF-8; the other variants are carried for wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OperationalEncoding {
    Utf16Le = 0x0000_0000,
    Utf16Be = 0x0000_0100,
    Utf8 = 0x0000_0200,
}

impl OperationalEncoding {
    pub fn from_bits(bits: u32) -> Option<OperationalEncoding> {
        use OperationalEncoding::*;
        Some(match bits & OperationalModes::ENCODING_MASK {
            0x0000_0000 => Utf16Le,
            0x0000_0100 => Utf16Be,
            0x0000_0200 => Utf8,
            _ => return None,
        })
    }
}

/// Legacy compression-mode bit field, retained for backward compatibility
/// with pre-standard STTP publishers; `OperationalModes` now carries
/// equivalent compression bits for new implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressionModes(pub u32);

impl CompressionModes {
    pub const NO_FLAGS: CompressionModes = CompressionModes(0x0000_0000);
    pub const GZIP: CompressionModes = CompressionModes(0x0000_0020);
    pub const TSSC: CompressionModes = CompressionModes(0x0000_0040);

    pub fn contains(self, other: CompressionModes) -> bool {
        self.0 & other.0 == other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_and_response_roundtrip_known_codes() {
        assert_eq!(
            ServerCommand::from_u8(0x06),
            Some(ServerCommand::DefineOperationalModes)
        );
        assert_eq!(ServerResponse::from_u8(0xFF), Some(ServerResponse::NoOp));
        assert_eq!(ServerResponse::from_u8(0x7F), None);
    }

    #[test]
    fn operational_modes_extracts_fields() {
        let modes = OperationalModes(
            2 | OperationalEncoding::Utf8 as u32 | OperationalModes::COMPRESS_PAYLOAD_DATA,
        );
        assert_eq!(modes.version(), 2);
        assert_eq!(
            OperationalEncoding::from_bits(modes.encoding()),
            Some(OperationalEncoding::Utf8)
        );
        assert!(modes.contains(OperationalModes::COMPRESS_PAYLOAD_DATA));
        assert!(!modes.contains(OperationalModes::COMPRESS_METADATA));
    }
}
