pub mod declarative;
