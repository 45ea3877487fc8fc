//! Renders a [`KernelPlan`] as an embeddable Rust module.
//!
//! The control buffer goes to a side blob (`control.bin`) pulled in with
//! `include_bytes!`; the scalar launch arguments become constants.

use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::quote;

use crate::solver::{KernelPlan, TensorPitches, KERNEL_NAME};

/// File name the generated module expects next to itself.
pub const CONTROL_BLOB: &str = "control.bin";

pub struct Generated {
    pub tokens: TokenStream,
    pub data_bytes: Vec<u8>,
    pub data_path: String,
}

pub fn generate_module(plan: &KernelPlan) -> Generated {
    Generated {
        tokens: render(plan),
        data_bytes: plan.control.to_le_bytes(),
        data_path: CONTROL_BLOB.to_string(),
    }
}

pub fn render(plan: &KernelPlan) -> TokenStream {
    let args = &plan.args;
    let total_bytes = plan.control.words().len() * 4;
    let total_words = plan.control.words().len();

    let c = args.c;
    let k = args.k;
    let groups = args.groups;
    let works = args.works;
    let flags = args.flags;
    let r = args.r;
    let s = args.s;
    let relu_alpha = args.relu_alpha;
    let kernel_name = KERNEL_NAME;
    let blob = CONTROL_BLOB;
    let input_pitches = render_pitches("INPUT", &args.input);
    let output_pitches = render_pitches("OUTPUT", &args.output);
    let [global_x, global_y, global_z] = plan.launch.global;
    let [local_x, local_y, local_z] = plan.launch.local;

    quote! {
        //! Generated control stream

        #[allow(dead_code)]
        #[repr(C, align(16))]
        struct AlignedBytes<const N: usize>([u8; N]);

        static CONTROL_BYTES: AlignedBytes<#total_bytes> =
            AlignedBytes(*include_bytes!(#blob));

        pub const KERNEL_NAME: &str = #kernel_name;

        pub const CONTROL_WORDS: usize = #total_words;
        pub const RECORDS: u32 = #works;
        pub const GROUPS: u32 = #groups;
        pub const CHANNELS: u32 = #c;
        pub const OUTPUT_CHANNELS: u32 = #k;
        pub const FILTER: [u32; 2] = [#r, #s];
        pub const FLAGS: u32 = #flags;
        pub const RELU_ALPHA: f32 = #relu_alpha;

        #input_pitches
        #output_pitches

        pub const GLOBAL_WORK: [usize; 3] = [#global_x, #global_y, #global_z];
        pub const LOCAL_WORK: [usize; 3] = [#local_x, #local_y, #local_z];

        /// Control words, decoded from the little-endian blob.
        pub fn control_words() -> impl Iterator<Item = u32> {
            CONTROL_BYTES
                .0
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }
    }
}

fn render_pitches(prefix: &str, pitches: &TensorPitches) -> TokenStream {
    let ident = |name: &str| Ident::new(&format!("{prefix}_{name}"), Span::call_site());
    let channel_ident = ident("CHANNEL_PITCH");
    let row_ident = ident("ROW_PITCH");
    let step_1_ident = ident("STEP_1_PITCH");
    let step_2_ident = ident("STEP_2_PITCH");
    let TensorPitches {
        channel,
        row,
        step_1,
        step_2,
    } = *pitches;
    let step_1 = signed_literal(step_1);
    let step_2 = signed_literal(step_2);
    quote! {
        pub const #channel_ident: u32 = #channel;
        pub const #row_ident: u32 = #row;
        pub const #step_1_ident: i32 = #step_1;
        pub const #step_2_ident: i32 = #step_2;
    }
}

/// Negative values become a unary minus over an unsigned literal.
fn signed_literal(value: i32) -> TokenStream {
    let magnitude = Literal::i64_unsuffixed((value as i64).abs());
    if value < 0 {
        quote!(-#magnitude)
    } else {
        quote!(#magnitude)
    }
}
