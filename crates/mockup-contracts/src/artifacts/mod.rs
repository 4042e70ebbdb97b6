mod receipts;

pub use receipts::{
    read_receipt, receipt_path_for, write_receipt, InputImageRecord, MockupReceipt,
    OutputImageRecord, RECEIPT_SCHEMA_VERSION,
};
