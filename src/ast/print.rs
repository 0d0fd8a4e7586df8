//! Prints a syntax tree back to its original source text.
//!
//! Every token carries its own trivia, so printing is an in-order walk that
//! concatenates trivia and raw token text.

use super::*;

pub(super) fn print_file(file: &File, out: &mut String) {
    for item in &file.items {
        print_file_item(item, out);
    }
    out.push_str(&file.trailing_trivia);
}

fn tok(t: &Tok, out: &mut String) {
    out.push_str(&t.trivia);
    out.push_str(&t.raw);
}

fn ident(i: &Ident, out: &mut String) {
    tok(&i.tok, out);
}

fn string_value(s: &StringValue, out: &mut String) {
    for lit in &s.literals {
        tok(&lit.tok, out);
    }
}

fn int_value(i: &IntValue, out: &mut String) {
    if let Some(minus) = &i.minus {
        tok(minus, out);
    }
    tok(&i.lit.tok, out);
}

fn type_ref(t: &TypeRef, out: &mut String) {
    if let Some(dot) = &t.leading_dot {
        tok(dot, out);
    }
    let mut dots = t.dots.iter();
    for (i, part) in t.parts.iter().enumerate() {
        if i != 0 {
            if let Some(dot) = dots.next() {
                tok(dot, out);
            }
        }
        ident(part, out);
    }
}

fn print_file_item(item: &FileItem, out: &mut String) {
    match item {
        FileItem::Syntax(syntax) => {
            tok(&syntax.keyword, out);
            tok(&syntax.equals, out);
            string_value(&syntax.value, out);
            tok(&syntax.semicolon, out);
        }
        FileItem::Package(package) => {
            tok(&package.keyword, out);
            type_ref(&package.name, out);
            tok(&package.semicolon, out);
        }
        FileItem::Import(import) => {
            tok(&import.keyword, out);
            if let Some((_, modifier)) = &import.modifier {
                tok(modifier, out);
            }
            string_value(&import.name, out);
            tok(&import.semicolon, out);
        }
        FileItem::Option(option) => print_option_decl(option, out),
        FileItem::Message(message) => print_message(message, out),
        FileItem::Enum(enum_) => print_enum(enum_, out),
        FileItem::Service(service) => print_service(service, out),
        FileItem::Extend(extend) => print_extend(extend, out),
        FileItem::Empty(semicolon) => tok(semicolon, out),
    }
}

fn print_option_decl(option: &OptionDecl, out: &mut String) {
    tok(&option.keyword, out);
    print_option_body(&option.body, out);
    tok(&option.semicolon, out);
}

fn print_option_body(body: &OptionBody, out: &mut String) {
    print_option_name(&body.name, out);
    tok(&body.equals, out);
    print_value(&body.value, out);
}

fn print_option_name(name: &OptionName, out: &mut String) {
    let mut dots = name.dots.iter();
    for (i, part) in name.parts.iter().enumerate() {
        if i != 0 {
            if let Some(dot) = dots.next() {
                tok(dot, out);
            }
        }
        match part {
            OptionNamePart::Plain(name) => ident(name, out),
            OptionNamePart::Extension { open, name, close } => {
                tok(open, out);
                type_ref(name, out);
                tok(close, out);
            }
        }
    }
}

fn print_value(value: &Value, out: &mut String) {
    match value {
        Value::Ident(name) => type_ref(name, out),
        Value::Int(int) => tok(&int.tok, out),
        Value::Float(float) => tok(&float.tok, out),
        Value::String(string) => string_value(string, out),
        Value::Signed { sign, value, .. } => {
            tok(sign, out);
            print_value(value, out);
        }
        Value::Array(array) => {
            tok(&array.open, out);
            let mut commas = array.commas.iter();
            for (i, value) in array.values.iter().enumerate() {
                if i != 0 {
                    if let Some(comma) = commas.next() {
                        tok(comma, out);
                    }
                }
                print_value(value, out);
            }
            tok(&array.close, out);
        }
        Value::Aggregate(aggregate) => print_aggregate(aggregate, out),
    }
}

fn print_aggregate(aggregate: &Aggregate, out: &mut String) {
    tok(&aggregate.open, out);
    for field in &aggregate.fields {
        match &field.name {
            AggregateFieldName::Plain(name) => ident(name, out),
            AggregateFieldName::Extension { open, name, close } => {
                tok(open, out);
                type_ref(name, out);
                tok(close, out);
            }
            AggregateFieldName::AnyUrl {
                open,
                domain,
                slash,
                name,
                close,
            } => {
                tok(open, out);
                type_ref(domain, out);
                tok(slash, out);
                type_ref(name, out);
                tok(close, out);
            }
        }
        if let Some(colon) = &field.colon {
            tok(colon, out);
        }
        print_value(&field.value, out);
        if let Some(separator) = &field.separator {
            tok(separator, out);
        }
    }
    tok(&aggregate.close, out);
}

fn print_compact_options(options: &CompactOptions, out: &mut String) {
    tok(&options.open, out);
    let mut commas = options.commas.iter();
    for (i, option) in options.options.iter().enumerate() {
        if i != 0 {
            if let Some(comma) = commas.next() {
                tok(comma, out);
            }
        }
        print_option_body(option, out);
    }
    tok(&options.close, out);
}

fn print_field_type(ty: &FieldType, out: &mut String) {
    match ty {
        FieldType::Scalar(_, name) => ident(name, out),
        FieldType::Named(name) => type_ref(name, out),
    }
}

fn print_field(field: &Field, out: &mut String) {
    if let Some(label) = &field.label {
        tok(&label.tok, out);
    }
    print_field_type(&field.ty, out);
    ident(&field.name, out);
    tok(&field.equals, out);
    int_value(&field.number, out);
    if let Some(options) = &field.options {
        print_compact_options(options, out);
    }
    tok(&field.semicolon, out);
}

fn print_map_field(field: &MapField, out: &mut String) {
    tok(&field.keyword, out);
    tok(&field.open_angle, out);
    ident(&field.key_ident, out);
    tok(&field.comma, out);
    print_field_type(&field.value_ty, out);
    tok(&field.close_angle, out);
    ident(&field.name, out);
    tok(&field.equals, out);
    int_value(&field.number, out);
    if let Some(options) = &field.options {
        print_compact_options(options, out);
    }
    tok(&field.semicolon, out);
}

fn print_group(group: &Group, out: &mut String) {
    if let Some(label) = &group.label {
        tok(&label.tok, out);
    }
    tok(&group.keyword, out);
    ident(&group.name, out);
    tok(&group.equals, out);
    int_value(&group.number, out);
    print_message_body(&group.body, out);
}

fn print_message(message: &Message, out: &mut String) {
    tok(&message.keyword, out);
    ident(&message.name, out);
    print_message_body(&message.body, out);
}

fn print_message_body(body: &MessageBody, out: &mut String) {
    tok(&body.open, out);
    for item in &body.items {
        print_message_item(item, out);
    }
    tok(&body.close, out);
}

fn print_message_item(item: &MessageItem, out: &mut String) {
    match item {
        MessageItem::Field(field) => print_field(field, out),
        MessageItem::Map(field) => print_map_field(field, out),
        MessageItem::Group(group) => print_group(group, out),
        MessageItem::Oneof(oneof) => print_oneof(oneof, out),
        MessageItem::Message(message) => print_message(message, out),
        MessageItem::Enum(enum_) => print_enum(enum_, out),
        MessageItem::Extend(extend) => print_extend(extend, out),
        MessageItem::ExtensionRange(range) => print_extension_range(range, out),
        MessageItem::Reserved(reserved) => print_reserved(reserved, out),
        MessageItem::Option(option) => print_option_decl(option, out),
        MessageItem::Empty(semicolon) => tok(semicolon, out),
    }
}

fn print_oneof(oneof: &Oneof, out: &mut String) {
    tok(&oneof.keyword, out);
    ident(&oneof.name, out);
    tok(&oneof.open, out);
    for item in &oneof.items {
        match item {
            OneofItem::Field(field) => print_field(field, out),
            OneofItem::Group(group) => print_group(group, out),
            OneofItem::Option(option) => print_option_decl(option, out),
            OneofItem::Empty(semicolon) => tok(semicolon, out),
        }
    }
    tok(&oneof.close, out);
}

fn print_tag_range(range: &TagRange, out: &mut String) {
    int_value(&range.start, out);
    if let Some((to, end)) = &range.to {
        tok(to, out);
        match end {
            RangeEnd::Int(int) => int_value(int, out),
            RangeEnd::Max(max) => tok(max, out),
        }
    }
}

fn print_extension_range(range: &ExtensionRange, out: &mut String) {
    tok(&range.keyword, out);
    let mut commas = range.commas.iter();
    for (i, tag_range) in range.ranges.iter().enumerate() {
        if i != 0 {
            if let Some(comma) = commas.next() {
                tok(comma, out);
            }
        }
        print_tag_range(tag_range, out);
    }
    if let Some(options) = &range.options {
        print_compact_options(options, out);
    }
    tok(&range.semicolon, out);
}

fn print_reserved(reserved: &Reserved, out: &mut String) {
    tok(&reserved.keyword, out);
    match &reserved.kind {
        ReservedKind::Ranges { ranges, commas } => {
            let mut commas = commas.iter();
            for (i, range) in ranges.iter().enumerate() {
                if i != 0 {
                    if let Some(comma) = commas.next() {
                        tok(comma, out);
                    }
                }
                print_tag_range(range, out);
            }
        }
        ReservedKind::Names { names, commas } => {
            let mut commas = commas.iter();
            for (i, name) in names.iter().enumerate() {
                if i != 0 {
                    if let Some(comma) = commas.next() {
                        tok(comma, out);
                    }
                }
                string_value(name, out);
            }
        }
    }
    tok(&reserved.semicolon, out);
}

fn print_enum(enum_: &Enum, out: &mut String) {
    tok(&enum_.keyword, out);
    ident(&enum_.name, out);
    tok(&enum_.open, out);
    for item in &enum_.items {
        match item {
            EnumItem::Value(value) => {
                ident(&value.name, out);
                tok(&value.equals, out);
                int_value(&value.number, out);
                if let Some(options) = &value.options {
                    print_compact_options(options, out);
                }
                tok(&value.semicolon, out);
            }
            EnumItem::Option(option) => print_option_decl(option, out),
            EnumItem::Reserved(reserved) => print_reserved(reserved, out),
            EnumItem::Empty(semicolon) => tok(semicolon, out),
        }
    }
    tok(&enum_.close, out);
}

fn print_service(service: &Service, out: &mut String) {
    tok(&service.keyword, out);
    ident(&service.name, out);
    tok(&service.open, out);
    for item in &service.items {
        match item {
            ServiceItem::Method(method) => print_method(method, out),
            ServiceItem::Option(option) => print_option_decl(option, out),
            ServiceItem::Empty(semicolon) => tok(semicolon, out),
        }
    }
    tok(&service.close, out);
}

fn print_method(method: &Method, out: &mut String) {
    tok(&method.keyword, out);
    ident(&method.name, out);
    print_method_type(&method.input, out);
    tok(&method.returns, out);
    print_method_type(&method.output, out);
    if let Some(body) = &method.body {
        tok(&body.open, out);
        for item in &body.items {
            match item {
                MethodItem::Option(option) => print_option_decl(option, out),
                MethodItem::Empty(semicolon) => tok(semicolon, out),
            }
        }
        tok(&body.close, out);
    }
    if let Some(semicolon) = &method.semicolon {
        tok(semicolon, out);
    }
}

fn print_method_type(ty: &MethodType, out: &mut String) {
    tok(&ty.open, out);
    if let Some(stream) = &ty.stream {
        tok(stream, out);
    }
    type_ref(&ty.ty, out);
    tok(&ty.close, out);
}

fn print_extend(extend: &Extend, out: &mut String) {
    tok(&extend.keyword, out);
    type_ref(&extend.extendee, out);
    tok(&extend.open, out);
    for item in &extend.items {
        match item {
            ExtendItem::Field(field) => print_field(field, out),
            ExtendItem::Group(group) => print_group(group, out),
            ExtendItem::Empty(semicolon) => tok(semicolon, out),
        }
    }
    tok(&extend.close, out);
}
