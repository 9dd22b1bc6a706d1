pub mod customers;
pub mod leads;
pub mod opportunities;
pub mod reports;
