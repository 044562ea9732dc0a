#![no_main]

use dynmsg::message::{Message, Value};
use dynmsg::schema::DescriptorParser;
use dynmsg_mutator::{ChaoSampler, Mutator, StdValueMutator};

use libfuzzer_sys::fuzz_target;

// Every mutation and cross-over must leave the tree schema-conformant and,
// with keep-initialized on, with all required fields present.
fuzz_target!(|data: &[u8]| {
    let schema = r#"
            enum Mode { IDLE, ACTIVE, DONE }

            Leaf {
                required int32 id,          # required scalar exercised by repair
                optional string note,
                repeated bytes blobs,
            }

            Branch {
                repeated Leaf leaves,       # repeated sub-messages
                optional Branch left,       # self reference
                optional Mode mode,
                oneof kind { int32 number, string text, Leaf special },
            }

            Root {
                required Branch trunk,
                repeated int32 weights,
                optional double scale,
                optional uint64 stamp,
            }
        "#;

    let mut parser = DescriptorParser::new();
    parser.parse_file(schema).expect("schema must parse");
    let descriptor = parser.get_descriptor("Root").unwrap();

    let mut seed_bytes = [0u8; 8];
    for (i, byte) in data.iter().take(8).enumerate() {
        seed_bytes[i] = *byte;
    }
    let seed = u64::from_le_bytes(seed_bytes);

    let mut mutator = Mutator::new(&parser, seed);
    let mut message = Message::new(descriptor);

    // The remaining input drives the mutation schedule.
    for byte in data.iter().skip(8).take(64) {
        let size_hint = (*byte as usize) * 4;
        mutator
            .mutate::<ChaoSampler<_>, ChaoSampler<_>, StdValueMutator>(&mut message, size_hint)
            .expect("mutation must succeed");
        assert!(message.is_initialized());
        check_enums(&message);

        if byte % 16 == 0 {
            let source = message.clone();
            mutator
                .cross_over(&source, &mut message)
                .expect("cross-over must succeed");
            assert!(message.is_initialized());
            check_enums(&message);
        }
    }
});

fn check_enums(message: &Message) {
    for i in 0..message.field_count() {
        let values: Vec<&Value> = match message.len(i) {
            0 => message.get(i, None).into_iter().collect(),
            n => (0..n).filter_map(|j| message.get(i, Some(j))).collect(),
        };
        for value in values {
            match value {
                Value::Enum(e) => assert!(e.index < e.count),
                Value::Message(nested) => check_enums(nested),
                _ => {}
            }
        }
    }
}
