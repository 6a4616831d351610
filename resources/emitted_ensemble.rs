// Generated by branchfree. Do not edit.

pub const N_FEATURES: usize = 3;
pub const N_TREES: usize = 5;

#[inline(always)]
fn eval_tree_0(f: &[f32]) -> f32 {
    if 0.5_f32 <= f[0] {
        0.0_f32
    } else {
        1.0_f32
    }
}

#[inline(always)]
fn eval_tree_1(f: &[f32]) -> f32 {
    if 0.25_f32 <= f[2] {
        f32::INFINITY
    } else {
        if -0.0_f32 <= f[1] {
            1e-40_f32
        } else {
            -2.0_f32
        }
    }
}

#[inline(always)]
fn eval_tree_2(_: &[f32]) -> f32 {
    -3e20_f32
}

#[inline(always)]
fn eval_tree_3(f: &[f32]) -> f32 {
    if f32::NEG_INFINITY <= f[2] {
        if 0.5_f32 <= f[0] {
            -0.125_f32
        } else {
            1.5_f32
        }
    } else {
        f32::NEG_INFINITY
    }
}

#[inline(always)]
fn eval_tree_4(_: &[f32]) -> f32 {
    0.5_f32
}

/// Score a feature vector of at least `N_FEATURES` values.
pub fn score(f: &[f32]) -> f32 {
    let mut score = 0.0_f32;
    score += eval_tree_0(f);
    score += eval_tree_1(f);
    score += eval_tree_2(f);
    score += eval_tree_3(f);
    score += eval_tree_4(f);
    score
}
