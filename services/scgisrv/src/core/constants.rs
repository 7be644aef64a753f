//! Gateway-wide constants
//!
//! Reserved addresses, wire sizes and housekeeping periods shared by the
//! ABUS stack and the services built on top of it.

use std::time::Duration;

/// Version reported through `sys.server_version`
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Reserved ABUS addresses
// ============================================================================

/// Address used by the push service when acknowledging controllers
pub const PUSH_NAD: u32 = 1;

/// Address used by the read/write service
pub const RW_NAD: u32 = 2;

/// Address used when pinging controllers during autodetection
pub const AUTODETECT_NAD: u32 = 3;

/// UDP port controllers listen on
pub const ABUS_PORT: u16 = 8442;

// ============================================================================
// Frame sizes
// ============================================================================

/// Default upper bound for a single ABUS frame on the wire
pub const MAX_FRAME_BYTES: usize = 1000;

/// Transport header: signature(2) + length(2) + from(4) + to(4)
pub const TRANSPORT_HEADER_LEN: usize = 12;

/// Transaction id trailer
pub const TRANSACTION_ID_LEN: usize = 2;

/// CRC trailer
pub const CRC_LEN: usize = 2;

/// Command frame head: direction(1) + type(1)
pub const COMMAND_HEAD_LEN: usize = 2;

/// Opcode byte of a command body
pub const COMMAND_OPCODE_LEN: usize = 1;

/// Everything in a random-memory frame that is not parameter data
///
/// = 12 (transport header) + 2 (tid) + 2 (crc) + 2 (command head) + 1 (opcode)
pub const FRAME_OVERHEAD: usize =
    TRANSPORT_HEADER_LEN + TRANSACTION_ID_LEN + CRC_LEN + COMMAND_HEAD_LEN + COMMAND_OPCODE_LEN;

/// Code memory is read in segments of this size
pub const CODE_SEGMENT_SIZE: u32 = 256;

// ============================================================================
// Controller memory layout
// ============================================================================

/// Segment holding the program head
pub const PLC_HEAD_SEGMENT: u16 = 0x0200;

/// Bytes read from the head segment
pub const PLC_HEAD_SIZE: u16 = 0x46;

/// File system descriptor location in code memory
pub const FILE_SYSTEM_ADDR: u32 = 0x20040;

/// Size of one file descriptor entry
pub const FILE_DESCRIPTOR_SIZE: usize = 46;

/// Name of the allocation archive stored in the controller file system
pub const ALC_FILE_NAME: &str = "alc.zip";

/// Magic numbers of a valid program head
pub const PLC_HEAD_MAGIC: [u16; 2] = [31415, 31416];

/// Data memory address acknowledged after a push
pub const PUSH_ACK_ADDRESS: u16 = 0x0417;

// ============================================================================
// Housekeeping
// ============================================================================

/// How often unused PLC infos are swept
pub const PLC_INFO_CLEAR_PERIOD: Duration = Duration::from_secs(10 * 60);

/// How long an unused PLC info survives before it may be swept
pub const PLC_INFO_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// Comm thread name, shows up in log lines
pub const COMM_THREAD_NAME: &str = "comm";

// ============================================================================
// Database tables
// ============================================================================

pub const MEASUREMENTS_TABLE: &str = "measurements";
pub const ALARMS_TABLE: &str = "alarms";
pub const RELAYS_TABLE: &str = "relays";

/// Stored in alarm timestamp columns that have not happened yet
pub const NULL_TIMESTAMP: &str = "0000-00-00";
