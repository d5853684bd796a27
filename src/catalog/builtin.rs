//! Built-in report types

/// Campus asset inventory, the report type the upload form ships with
pub const BUILTIN_CATALOG_YAML: &str = r#"
reports:
  - report_type: campus_assets
    title: Campus Assets Management System
    subtitle: Resource Inventory Report
    base_currency: INR
    analysis_instructions: >-
      The table is a campus resource inventory. Summarize total asset value,
      where value is concentrated by location and device, how old the
      inventory is, and any data quality concerns. Suggest concrete
      procurement or maintenance actions.
    columns:
      - name: sl_no
        label: Sl. No
        type: integer
        aliases: [s_no, serial_no, serial_number]
      - name: device_name
        label: Device Name
        type: string
        required: true
        key: true
        aliases: [device, asset, asset_name, item]
        constraints:
          max_length: 200
      - name: quantity
        type: integer
        required: true
        aliases: [qty, count]
        constraints:
          positive: true
      - name: description
        type: string
        required: true
        aliases: [details, specification]
        constraints:
          max_length: 1000
      - name: procurement_date
        label: Procurement Date
        type: date
        required: true
        key: true
        aliases: [purchase_date, purchased_on, date]
      - name: location
        type: string
        required: true
        key: true
        aliases: [room, site, building]
      - name: cost
        label: Cost
        type: currency
        required: true
        aliases: [price, amount, unit_cost, cost_rs, cost_inr]
        constraints:
          non_negative: true
      - name: department
        type: string
        aliases: [dept]
        case: upper
    derived:
      - name: total_value
        label: Total Value
        op: product
        of: [cost, quantity]
    charts:
      - id: value_by_location
        title: Asset value by location
        kind: bar
        source: group_sum
        group_by: location
        value: total_value
        top: 10
      - id: quantity_by_device
        title: Units by device
        kind: horizontal_bar
        source: group_sum
        group_by: device_name
        value: quantity
        top: 10
      - id: procurement_timeline
        title: Procurement value over time
        kind: line
        source: series
        x: procurement_date
        value: total_value
    detail_columns: [device_name, quantity, location, procurement_date, cost]
    inventory:
      item: device_name
      quantity: quantity
      location: location
      acquired: procurement_date
      unit_cost: cost
"#;
