pub mod accounting_sink;
pub mod csv_sink;
