pub mod bandwidth;
