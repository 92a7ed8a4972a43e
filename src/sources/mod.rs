pub mod ssf;
