pub mod place_bid;
