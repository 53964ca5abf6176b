// allowing panics since this is the standard way to show an
// error message from a proc-macro derive crate.
#![allow(clippy::panic)]

//! This crate introduces a proc macro derive generating the opcode tables of
//! `dv_dex::instrs::Instr` from per-variant attributes.
//!
//! Each Dalvik opcode is declared once, with its opcode byte, its mnemonic, its
//! encoding format and its static control-flow facts. From these attributes the
//! derive produces:
//! - the `dv_dex::instrs::Instruction` trait implementation (static facts),
//! - a decoder dispatching an opcode byte to the format parser of `dv_dex::formats`,
//! - an encoder dispatching a variant to the format emitter of `dv_dex::formats`,
//! - an operand listing used for display.
//!
//! Variants with `format = "custom"` (payload pseudo-instructions and unused opcodes)
//! are left to hand-written code in `dv_dex`.

extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::Span;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DataEnum, DeriveInput, Expr, ExprLit, Fields, Ident, Lit,
    LitBool, LitInt, LitStr, Meta, MetaNameValue, NestedMeta, Variant,
};

/// The main Dalvik bytecode `Instruction` proc macro derive.
///
/// Supported attributes:
/// - `opcode`: the opcode byte (mandatory unless `format = "custom"`),
/// - `mnemonic`: the name printed in listings,
/// - `format`: the Dex format of the instruction
/// (see [Dalvik Executable instruction formats](https://source.android.com/devices/tech/dalvik/instruction-formats)),
/// its first digit gives the size in code units,
/// - `size`: an expression over the tuple fields (`_0`, `_1`, ...) giving the size of
/// `custom` format variants,
/// - flags `can_throw`, `can_branch`, `can_switch`, `is_return`, `is_invoke`
/// (default: `false`) and `no_continue` (instruction never falls through).
#[proc_macro_derive(Instruction, attributes(instruction))]
pub fn instruction_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    let gen = derive_instruction_all(&ast);
    gen.into()
}

fn derive_instruction_all(ast: &DeriveInput) -> TokenStream2 {
    let name = &ast.ident;
    let Data::Enum(data) = &ast.data else {
        panic!("#[derive(Instruction)] is only defined for enums")
    };

    let facts_impl = derive_facts_impl(name, data);
    let codec_impl = derive_codec_impl(name, data);

    quote! {
        #facts_impl
        #codec_impl
    }
}

fn derive_facts_impl(name: &Ident, data: &DataEnum) -> TokenStream2 {
    let opcode_matches = data.variants.iter().map(|v| opcode_match(name, v));
    let mnemonic_matches = data.variants.iter().map(|v| {
        let value = get_instruction_string_value(&v.attrs, "mnemonic");
        fact_match(name, v, &quote! { #value })
    });
    let format_matches = data.variants.iter().map(|v| {
        let value = get_instruction_string_value(&v.attrs, "format");
        fact_match(name, v, &quote! { #value })
    });
    let size_matches = data.variants.iter().map(|v| size_match(name, v));
    let throw_matches = bool_matches(name, data, "can_throw");
    let branch_matches = bool_matches(name, data, "can_branch");
    let switch_matches = bool_matches(name, data, "can_switch");
    let return_matches = bool_matches(name, data, "is_return");
    let invoke_matches = bool_matches(name, data, "is_invoke");
    let continue_matches = data.variants.iter().map(|v| {
        let stops = get_instruction_bool_value(&v.attrs, "no_continue").value;
        let value = LitBool {
            value: !stops,
            span: Span::call_site(),
        };
        fact_match(name, v, &quote! { #value })
    });

    quote! {
        impl Instruction for #name {
            fn opcode(&self) -> u8 {
                match self {
                    #(#opcode_matches)*
                }
            }

            fn mnemonic(&self) -> &str {
                match self {
                    #(#mnemonic_matches)*
                }
            }

            fn format(&self) -> &str {
                match self {
                    #(#format_matches)*
                }
            }

            fn size(&self) -> usize {
                match self {
                    #(#size_matches)*
                }
            }

            fn can_throw(&self) -> bool {
                match self {
                    #(#throw_matches)*
                }
            }

            fn can_branch(&self) -> bool {
                match self {
                    #(#branch_matches)*
                }
            }

            fn can_switch(&self) -> bool {
                match self {
                    #(#switch_matches)*
                }
            }

            fn can_continue(&self) -> bool {
                match self {
                    #(#continue_matches)*
                }
            }

            fn is_return(&self) -> bool {
                match self {
                    #(#return_matches)*
                }
            }

            fn is_invoke(&self) -> bool {
                match self {
                    #(#invoke_matches)*
                }
            }
        }
    }
}

fn derive_codec_impl(name: &Ident, data: &DataEnum) -> TokenStream2 {
    let coded: Vec<&Variant> = data
        .variants
        .iter()
        .filter(|v| get_instruction_string_value(&v.attrs, "format").value() != "custom")
        .collect();

    let decode_arms = coded.iter().map(|v| decode_arm(name, v));
    let encode_arms = coded.iter().map(|v| encode_arm(name, v));
    let operand_arms = coded.iter().map(|v| operands_arm(name, v));

    quote! {
        impl #name {
            /// Decodes the operands following `op` with the parser of the opcode format.
            /// Opcodes of `custom` variants are forwarded to `decode_custom`.
            pub(crate) fn decode_opcode(
                op: u8,
                input: &[u8],
            ) -> nom::IResult<&[u8], Self, crate::errors::DexError> {
                match op {
                    #(#decode_arms)*
                    _ => Self::decode_custom(op, input),
                }
            }

            /// Appends the little-endian encoding of the instruction to `out`.
            pub fn encode_into(&self, out: &mut Vec<u8>) -> crate::errors::DexResult<()> {
                match self {
                    #(#encode_arms)*
                    _ => self.encode_custom(out),
                }
            }

            /// Returns the operands of the instruction, in encoding order.
            pub fn operands(&self) -> Vec<crate::instrs::Operand> {
                match self {
                    #(#operand_arms)*
                    _ => self.custom_operands(),
                }
            }
        }
    }
}

fn decode_arm(name: &Ident, variant: &Variant) -> TokenStream2 {
    let ident = &variant.ident;
    let opcode = get_instruction_int_value(&variant.attrs, "opcode");
    let format = get_instruction_string_value(&variant.attrs, "format").value();
    let parser = Ident::new(&format!("parse_{format}"), Span::call_site());
    let params = field_idents(variant);

    let build = if params.is_empty() {
        quote! { #name::#ident }
    } else {
        quote! { #name::#ident(#(From::from(#params)),*) }
    };

    quote! {
        #opcode => {
            let (input, (#(#params,)*)) = crate::formats::#parser(input)?;
            Ok((input, #build))
        }
    }
}

fn encode_arm(name: &Ident, variant: &Variant) -> TokenStream2 {
    let ident = &variant.ident;
    let opcode = get_instruction_int_value(&variant.attrs, "opcode");
    let format = get_instruction_string_value(&variant.attrs, "format").value();
    let emitter = Ident::new(&format!("emit_{format}"), Span::call_site());
    let params = field_idents(variant);

    let pattern = if params.is_empty() {
        quote! {}
    } else {
        quote! { (#(#params),*) }
    };

    quote! {
        #name::#ident #pattern => crate::formats::#emitter(out, #opcode, (#(#params,)*)),
    }
}

// The last operand of `t` formats is a relative code offset.
fn operands_arm(name: &Ident, variant: &Variant) -> TokenStream2 {
    let ident = &variant.ident;
    let format = get_instruction_string_value(&variant.attrs, "format").value();
    let params = field_idents(variant);
    let has_offset = format.ends_with('t');

    let pattern = if params.is_empty() {
        quote! {}
    } else {
        quote! { (#(#params),*) }
    };
    let operands = params.iter().enumerate().map(|(i, p)| {
        if has_offset && i + 1 == params.len() {
            quote! { crate::instrs::Operand::Offset(i32::from(*#p)) }
        } else {
            quote! { crate::instrs::IntoOperand::to_operand(#p) }
        }
    });

    quote! {
        #name::#ident #pattern => vec![#(#operands),*],
    }
}

fn opcode_match(name: &Ident, variant: &Variant) -> TokenStream2 {
    let ident = &variant.ident;
    let format = get_instruction_string_value(&variant.attrs, "format").value();
    if format == "custom" {
        let fields = named_fields_pattern(variant);
        let expr: Expr = get_instruction_string_value(&variant.attrs, "opcode_expr")
            .parse()
            .expect("opcode_expr");
        quote! {
            #[allow(unused_variables)]
            #name::#ident #fields => #expr,
        }
    } else {
        let fields = anonymous_fields_pattern(variant);
        let opcode = get_instruction_int_value(&variant.attrs, "opcode");
        quote! {
            #name::#ident #fields => #opcode,
        }
    }
}

fn fact_match(name: &Ident, variant: &Variant, value: &TokenStream2) -> TokenStream2 {
    let ident = &variant.ident;
    let fields = anonymous_fields_pattern(variant);

    quote! {
        #name::#ident #fields => #value,
    }
}

fn bool_matches(name: &Ident, data: &DataEnum, attr: &str) -> Vec<TokenStream2> {
    data.variants
        .iter()
        .map(|v| {
            let value = get_instruction_bool_value(&v.attrs, attr);
            fact_match(name, v, &quote! { #value })
        })
        .collect()
}

fn size_match(name: &Ident, variant: &Variant) -> TokenStream2 {
    let ident = &variant.ident;
    let fields = named_fields_pattern(variant);
    let format = get_instruction_string_value(&variant.attrs, "format").value();
    let size: Expr = if &format == "custom" {
        let size_attr = get_instruction_string_value(&variant.attrs, "size");
        size_attr.parse().expect("size")
    } else if !format.is_empty() && format.chars().next().expect("next char").is_ascii_digit() {
        let sz = &format[0..1];
        Expr::Lit(ExprLit {
            attrs: vec![],
            lit: Lit::Int(LitInt::new(sz, Span::call_site())),
        })
    } else {
        panic!("bad 'format' attribute");
    };

    quote! {
        #[allow(unused_variables)]
        #name::#ident #fields => #size,
    }
}

fn field_idents(variant: &Variant) -> Vec<Ident> {
    match &variant.fields {
        Fields::Unnamed(flds) => flds
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, _)| Ident::new(&format!("_{i}"), Span::call_site()))
            .collect(),
        Fields::Unit => Vec::new(),
        Fields::Named(_) => panic!("named fields are not supported for coded instructions"),
    }
}

fn anonymous_fields_pattern(variant: &Variant) -> TokenStream2 {
    match &variant.fields {
        Fields::Named(_) => quote! { { .. } },
        Fields::Unnamed(flds) => {
            let voids: Vec<TokenStream2> = flds.unnamed.iter().map(|_| quote! { _ }).collect();
            quote! {(#(#voids),*)}
        }
        Fields::Unit => quote! {},
    }
}

fn named_fields_pattern(variant: &Variant) -> TokenStream2 {
    match &variant.fields {
        Fields::Named(flds) => {
            let params: Vec<_> = flds
                .named
                .iter()
                .map(|n| n.ident.clone().expect("identifier"))
                .collect();
            quote! {{ #(#params),* }}
        }
        Fields::Unnamed(_) => {
            let params = field_idents(variant);
            quote! {(#(#params),*)}
        }
        Fields::Unit => quote! {},
    }
}

fn get_instruction_values(attr: &Attribute) -> Vec<MetaNameValue> {
    if !attr.path.is_ident("instruction") {
        return Vec::new();
    }

    match attr.parse_meta() {
        Ok(Meta::NameValue(v)) => vec![v],
        Ok(Meta::List(meta)) => meta
            .nested
            .into_iter()
            .map(|nested| match nested {
                NestedMeta::Meta(Meta::Path(path)) => {
                    let span = path
                        .segments
                        .first()
                        .expect("path first segment")
                        .ident
                        .span();
                    MetaNameValue {
                        path,
                        eq_token: syn::token::Eq { spans: [span] },
                        lit: Lit::Bool(LitBool { value: true, span }),
                    }
                }
                NestedMeta::Meta(Meta::NameValue(n)) => n,
                _ => panic!("expected #[instruction(...)]"),
            })
            .collect(),
        _ => panic!("expected #[instruction(...)]"),
    }
}

fn get_instruction_string_value(attrs: &[Attribute], name: &str) -> LitStr {
    for name_value in attrs.iter().flat_map(get_instruction_values) {
        if name_value.path.is_ident(name) {
            match &name_value.lit {
                Lit::Str(s) => return s.clone(),
                _ => panic!("expected string for '{name}' value"),
            }
        }
    }
    panic!("missing '{name}' attribute");
}

fn get_instruction_int_value(attrs: &[Attribute], name: &str) -> LitInt {
    for name_value in attrs.iter().flat_map(get_instruction_values) {
        if name_value.path.is_ident(name) {
            match &name_value.lit {
                Lit::Int(i) => {
                    let value: u8 = i
                        .base10_parse()
                        .unwrap_or_else(|_| panic!("'{name}' must fit in a byte"));
                    return LitInt::new(&format!("{value}u8"), i.span());
                }
                _ => panic!("expected integer for '{name}' value"),
            }
        }
    }
    panic!("missing '{name}' attribute");
}

fn get_instruction_bool_value(attrs: &[Attribute], name: &str) -> LitBool {
    for name_value in attrs.iter().flat_map(get_instruction_values) {
        if name_value.path.is_ident(name) {
            match &name_value.lit {
                Lit::Bool(b) => return b.clone(),
                _ => panic!("expected bool for '{name}' value"),
            }
        }
    }
    LitBool {
        value: false,
        span: Span::call_site(),
    }
}
