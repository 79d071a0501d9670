//! Externally visible record structure. The wire format is defined in
//! `proto/log.proto`; the types here carry the matching [`prost::Message`]
//! implementation and are checked in rather than generated at build time.

/// Types for the `log.v1` wire format.
pub mod v1 {
    /// A single entry in the commit log.
    ///
    /// The offset is assigned by the log on append; producers leave it
    /// unset. Records returned from reads have the offset populated.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Record {
        #[prost(bytes = "vec", tag = "1")]
        pub value: ::prost::alloc::vec::Vec<u8>,
        #[prost(uint64, tag = "2")]
        pub offset: u64,
    }
}
