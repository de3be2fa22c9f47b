pub mod list_bids;
