//! Window/scaler binder: turns scaler reservations into programmed units.

mod binder;

pub use binder::{
    BindFailure, BindOptions, BindReport, ScalerBinding, bind_scalers, scaler_job,
};
