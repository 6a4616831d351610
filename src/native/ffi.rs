/*!
C API for the native bulk evaluator. A host process builds an ensemble through an opaque handle and scores batches of feature vectors in a single call. All functions return a status code which is zero on success or one of the negative [`NativeStatus`] codes on error.
*/

#![allow(clippy::missing_safety_doc)]

use super::NativeEnsemble;
use crate::errors::NativeStatus;
use std::panic::catch_unwind;

fn status(result: std::thread::Result<Result<(), NativeStatus>>) -> i32 {
    match result {
        Ok(Ok(())) => 0,
        Ok(Err(status)) => status.code(),
        Err(_) => NativeStatus::Panic.code(),
    }
}

/// Create an ensemble with room for `num_trees` trees and `num_nodes` nodes. On success, the handle is written to `handle_ptr`. You must call `branchfree_ensemble_destroy` exactly once when you are done with it.
#[no_mangle]
pub extern "C" fn branchfree_ensemble_create(
    num_trees: usize,
    num_nodes: usize,
    handle_ptr: *mut *mut NativeEnsemble,
) -> i32 {
    if handle_ptr.is_null() {
        return NativeStatus::NullPointer.code();
    }
    let result = catch_unwind(|| NativeEnsemble::create(num_trees, num_nodes));
    match result {
        Ok(Ok(ensemble)) => {
            unsafe { *handle_ptr = Box::into_raw(Box::new(ensemble)) };
            0
        }
        Ok(Err(_)) => NativeStatus::Allocation.code(),
        Err(_) => NativeStatus::Panic.code(),
    }
}

/// Append one balanced tree. `feature_ids` and `values` must both point to `len` heap-order entries.
#[no_mangle]
pub unsafe extern "C" fn branchfree_ensemble_add_tree(
    handle: *mut NativeEnsemble,
    depth: u8,
    len: usize,
    feature_ids: *const u32,
    values: *const f32,
) -> i32 {
    if handle.is_null() || feature_ids.is_null() || values.is_null() {
        return NativeStatus::NullPointer.code();
    }
    status(catch_unwind(|| {
        let ensemble = &mut *handle;
        let feature_ids = std::slice::from_raw_parts(feature_ids, len);
        let values = std::slice::from_raw_parts(values, len);
        ensemble.add_tree(depth as usize, feature_ids, values)
    }))
}

/// Score one feature vector of `n_features` values, writing the score to `out`.
#[no_mangle]
pub unsafe extern "C" fn branchfree_ensemble_eval(
    handle: *const NativeEnsemble,
    features: *const f32,
    n_features: usize,
    out: *mut f32,
) -> i32 {
    if handle.is_null() || out.is_null() || (features.is_null() && n_features > 0) {
        return NativeStatus::NullPointer.code();
    }
    status(catch_unwind(|| {
        let ensemble = &*handle;
        let features = if n_features == 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(features, n_features)
        };
        *out = ensemble.eval_one(features);
        Ok(())
    }))
}

/// Score `n_vectors` feature vectors of `n_features` values each. `vectors` points to `n_vectors` pointers, and `out` must have room for `n_vectors` scores.
#[no_mangle]
pub unsafe extern "C" fn branchfree_ensemble_eval_many(
    handle: *const NativeEnsemble,
    vectors: *const *const f32,
    n_features: usize,
    n_vectors: usize,
    out: *mut f32,
) -> i32 {
    if handle.is_null() {
        return NativeStatus::NullPointer.code();
    }
    if n_vectors == 0 {
        return 0;
    }
    if vectors.is_null() || out.is_null() {
        return NativeStatus::NullPointer.code();
    }
    status(catch_unwind(|| {
        let ensemble = &*handle;
        let pointers = std::slice::from_raw_parts(vectors, n_vectors);
        if pointers.iter().any(|p| p.is_null()) && n_features > 0 {
            return Err(NativeStatus::NullPointer);
        }
        let features: Vec<&[f32]> = pointers
            .iter()
            .map(|p| if n_features == 0 { &[][..] } else { std::slice::from_raw_parts(*p, n_features) })
            .collect();
        let out = std::slice::from_raw_parts_mut(out, n_vectors);
        ensemble.eval_many(&features, out)
    }))
}

/// Free the ensemble pointed to by `*handle_ptr` and null the handle. Calling it again on the nulled handle is a no-op.
#[no_mangle]
pub unsafe extern "C" fn branchfree_ensemble_destroy(handle_ptr: *mut *mut NativeEnsemble) -> i32 {
    if handle_ptr.is_null() {
        return NativeStatus::NullPointer.code();
    }
    let handle = std::ptr::replace(handle_ptr, std::ptr::null_mut());
    if handle.is_null() {
        return 0;
    }
    status(catch_unwind(|| {
        Box::from_raw(handle).destroy();
        Ok(())
    }))
}
