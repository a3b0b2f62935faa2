pub mod xmi;
