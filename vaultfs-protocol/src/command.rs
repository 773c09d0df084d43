//! Command byte definitions

/// Command discriminator carried in every frame.
///
/// The wire encoding is a single byte; `Error` is `-1` as a signed byte
/// (`0xFF` on the wire). Unknown bytes decode to `Error` so a peer speaking
/// a newer dialect degrades to the error path instead of desyncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client → Data: payload is the content hash, stream region is the blob
    UploadRequest,
    /// Data → client: status text
    UploadResponse,
    /// Client → Data: payload is the content hash
    DownloadRequest,
    /// Data → client: payload is the decimal blob size, stream region is the blob
    DownloadResponse,

    /// Client → Name: ask for an upload target
    RequestUploadLoc,
    /// Name → client: `host:port` of the chosen data service
    ResponseUploadLoc,
    /// Client → Name: `filename|hash|address`
    CommitFile,
    /// Name → client: storage id of the committed file
    ResponseCommit,
    /// Client → Name: storage id to resolve
    RequestDownloadLoc,
    /// Name → client: `filename|hash|address`
    ResponseDownloadLoc,

    /// Name → client: hash already stored, payload is its location
    ResponseExist,
    /// Name → client: hash unknown
    ResponseNotExist,
    /// Client → Name: ask for admission to upload a hash
    PreUpload,
    /// Name → client: admission granted
    ResponseAllow,
    /// Name → client: another writer holds the hash, retry later
    ResponseWait,

    /// Data → Registry: `address|freeSpace`
    RegisterDatanode,
    /// Data → Registry: `address|freeSpace`
    HeartbeatDatanode,
    /// Name → Registry: ask for the live data set
    GetDatanodes,
    /// Registry → Name: comma list of `address|freeSpace`
    ResponseDatanodes,
    /// Name → Registry: `address`
    RegisterNamenode,
    /// Client → Registry: ask for the live name set
    GetNamenodes,
    /// Registry → client: comma list of `address`
    ResponseNamenodes,
    /// Name → Registry: `address`
    HeartbeatNamenode,

    /// Any direction: payload is a utf-8 reason
    Error,
}

impl Command {
    /// Wire byte for this command.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Command::UploadRequest => 1,
            Command::UploadResponse => 2,
            Command::DownloadRequest => 3,
            Command::DownloadResponse => 4,
            Command::RequestUploadLoc => 10,
            Command::ResponseUploadLoc => 11,
            Command::CommitFile => 12,
            Command::ResponseCommit => 13,
            Command::RequestDownloadLoc => 14,
            Command::ResponseDownloadLoc => 15,
            Command::ResponseExist => 21,
            Command::ResponseNotExist => 22,
            Command::PreUpload => 23,
            Command::ResponseAllow => 24,
            Command::ResponseWait => 25,
            Command::RegisterDatanode => 30,
            Command::HeartbeatDatanode => 32,
            Command::GetDatanodes => 33,
            Command::ResponseDatanodes => 34,
            Command::RegisterNamenode => 35,
            Command::GetNamenodes => 37,
            Command::ResponseNamenodes => 38,
            Command::HeartbeatNamenode => 39,
            // -1 as a signed byte
            Command::Error => 0xFF,
        }
    }

    /// Decode a wire byte; unknown values map to [`Command::Error`].
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Command::UploadRequest,
            2 => Command::UploadResponse,
            3 => Command::DownloadRequest,
            4 => Command::DownloadResponse,
            10 => Command::RequestUploadLoc,
            11 => Command::ResponseUploadLoc,
            12 => Command::CommitFile,
            13 => Command::ResponseCommit,
            14 => Command::RequestDownloadLoc,
            15 => Command::ResponseDownloadLoc,
            21 => Command::ResponseExist,
            22 => Command::ResponseNotExist,
            23 => Command::PreUpload,
            24 => Command::ResponseAllow,
            25 => Command::ResponseWait,
            30 => Command::RegisterDatanode,
            32 => Command::HeartbeatDatanode,
            33 => Command::GetDatanodes,
            34 => Command::ResponseDatanodes,
            35 => Command::RegisterNamenode,
            37 => Command::GetNamenodes,
            38 => Command::ResponseNamenodes,
            39 => Command::HeartbeatNamenode,
            _ => Command::Error,
        }
    }
}
