mod record;

pub use self::record::FileRecord;
pub(crate) use self::record::FileRow;
